use crate::api::client::GenerativeBackend;
use crate::api::models::{Content, GenerateContentRequest};
use crate::error::RewriteError;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStyle {
    Expand,
    Professional,
}

impl RewriteStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "expand" => Some(Self::Expand),
            "professional" | "pro" => Some(Self::Professional),
            _ => None,
        }
    }

    fn system_instruction(self) -> &'static str {
        match self {
            Self::Expand => {
                "Act as a rewriting assistant. Rephrase or expand the provided text to make it more expressive \
                 or longer. Reply with the rewritten text only, without any extra commentary."
            }
            Self::Professional => {
                "Act as a rewriting assistant. Rephrase the provided text to make it more polite and \
                 professional. Reply with the rewritten text only, without any extra commentary."
            }
        }
    }

    fn task(self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Professional => "rephrase professionally",
        }
    }
}

/// Rewrites a draft through a text-generation model.
pub struct DraftRewriter {
    backend: Arc<dyn GenerativeBackend>,
    model: String,
}

impl DraftRewriter {
    pub fn new(backend: Arc<dyn GenerativeBackend>, model: impl Into<String>) -> Self {
        Self { backend, model: model.into() }
    }

    pub async fn rewrite(&self, text: &str, style: RewriteStyle) -> Result<String, RewriteError> {
        let mut request = GenerateContentRequest::from_text(format!("Text to {}: \"{}\"", style.task(), text.trim()));
        request.system_instruction = Some(Content::text(style.system_instruction()));

        let response = self.backend.generate_content(&self.model, &request).await?;
        match response.first_part().and_then(|p| p.text.as_deref()).map(str::trim) {
            Some(t) if !t.is_empty() => Ok(t.to_string()),
            _ => Err(RewriteError::EmptyResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::GenerateContentResponse;
    use crate::error::TransportError;
    use crate::test_support::{text_response, ScriptedBackend};

    #[tokio::test]
    async fn returns_trimmed_first_candidate() {
        let backend = Arc::new(ScriptedBackend::default().reply(Ok(text_response("  Good day to you.\n"))));
        let rewriter = DraftRewriter::new(backend.clone(), "text-model");

        let out = rewriter.rewrite("hi", RewriteStyle::Professional).await.unwrap();
        assert_eq!(out, "Good day to you.");

        let (model, req) = backend.last_request();
        assert_eq!(model, "text-model");
        assert_eq!(req.contents[0].parts[0].text.as_deref(), Some("Text to rephrase professionally: \"hi\""));
        let system = req.system_instruction.unwrap().parts[0].text.clone().unwrap();
        assert!(system.contains("professional"));
    }

    #[tokio::test]
    async fn styles_pick_different_instructions() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .reply(Ok(text_response("a")))
                .reply(Ok(text_response("b"))),
        );
        let rewriter = DraftRewriter::new(backend.clone(), "m");
        rewriter.rewrite("x", RewriteStyle::Expand).await.unwrap();
        let expand = backend.last_request().1.system_instruction.unwrap();
        rewriter.rewrite("x", RewriteStyle::Professional).await.unwrap();
        let pro = backend.last_request().1.system_instruction.unwrap();
        assert_ne!(expand.parts[0].text, pro.parts[0].text);
    }

    #[tokio::test]
    async fn missing_or_blank_text_is_empty_response() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .reply(Ok(GenerateContentResponse::default()))
                .reply(Ok(text_response("   "))),
        );
        let rewriter = DraftRewriter::new(backend, "m");
        assert!(matches!(rewriter.rewrite("x", RewriteStyle::Expand).await, Err(RewriteError::EmptyResponse)));
        assert!(matches!(rewriter.rewrite("x", RewriteStyle::Expand).await, Err(RewriteError::EmptyResponse)));
    }

    #[tokio::test]
    async fn http_failure_is_transport_error() {
        let backend = Arc::new(ScriptedBackend::default().reply(Err(TransportError::Status(503))));
        let rewriter = DraftRewriter::new(backend, "m");
        assert!(matches!(
            rewriter.rewrite("x", RewriteStyle::Expand).await,
            Err(RewriteError::Transport(TransportError::Status(503)))
        ));
    }

    #[test]
    fn style_parsing() {
        assert_eq!(RewriteStyle::parse(""), Some(RewriteStyle::Expand));
        assert_eq!(RewriteStyle::parse("Professional"), Some(RewriteStyle::Professional));
        assert_eq!(RewriteStyle::parse("poem"), None);
    }
}
