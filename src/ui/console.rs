use crate::controller::{ConversationController, Outcome};
use crate::rewrite::RewriteStyle;
use crate::sync::SyncUpdate;
use crate::ui::render;
use std::rc::Rc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
/chat <id>          start or switch to a chat with a friend
/open <n>           switch to contact number n
/contacts           list chats from this session
/draft <text>       set the draft without sending
/send               send the draft
/rewrite [expand|professional]
                    let the model rewrite the draft
/speak <n>          read message n aloud
/show               print the current thread
/close              leave the current chat
/quit
Any other line is sent as a message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    Open(usize),
    Contacts,
    Draft(String),
    Send,
    Say(String),
    Rewrite(RewriteStyle),
    Speak(usize),
    Show,
    Close,
    Help,
    Quit,
    Invalid(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };
    let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    let index = |arg: &str| arg.trim().parse::<usize>().ok().filter(|n| *n > 0);
    match name {
        "chat" => Command::Chat(arg.to_string()),
        "open" => index(arg).map_or_else(|| Command::Invalid(line.to_string()), Command::Open),
        "contacts" => Command::Contacts,
        "draft" => Command::Draft(arg.to_string()),
        "send" => Command::Send,
        "rewrite" => RewriteStyle::parse(arg).map_or_else(|| Command::Invalid(line.to_string()), Command::Rewrite),
        "speak" => index(arg).map_or_else(|| Command::Invalid(line.to_string()), Command::Speak),
        "show" => Command::Show,
        "close" => Command::Close,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Invalid(line.to_string()),
    }
}

fn print_thread(controller: &ConversationController) {
    match controller.current_recipient() {
        Some(friend) => println!("--- chat with {} ---", friend),
        None => {
            println!("(no chat open)");
            return;
        }
    }
    println!(
        "{}",
        render::thread(&controller.messages(), controller.user_id(), &controller.playback())
    );
}

fn print_notices(controller: &ConversationController) {
    if let Some(text) = render::notices(&controller.notices()) {
        println!("{}", text);
    }
}

fn dispatch(controller: &Rc<ConversationController>, command: Command) {
    match command {
        Command::Chat(id) => {
            if controller.start_chat(&id) == Outcome::Completed {
                controller.process_pending();
                print_thread(controller);
            }
        }
        Command::Open(n) => match controller.contacts().get(n - 1) {
            Some(contact) => {
                controller.select_contact(contact);
                controller.process_pending();
                print_thread(controller);
            }
            None => println!("no contact {}", n),
        },
        Command::Contacts => {
            let current = controller.current_recipient();
            println!("{}", render::contacts(&controller.contacts(), current.as_ref()));
        }
        Command::Draft(text) => controller.set_draft(&text),
        Command::Say(text) => {
            controller.set_draft(&text);
            spawn_send(controller);
        }
        Command::Send => spawn_send(controller),
        Command::Rewrite(style) => {
            let c = Rc::clone(controller);
            tokio::task::spawn_local(async move {
                match c.rewrite_draft(style).await {
                    Outcome::Completed => println!("draft: {}", c.draft()),
                    Outcome::Ignored if c.is_drafting() => println!("a rewrite is already running"),
                    Outcome::Ignored => println!("nothing to rewrite"),
                    Outcome::Failed => print_notices(&c),
                }
            });
        }
        Command::Speak(n) => {
            let Some(message) = controller.messages().get(n - 1).cloned() else {
                println!("no message {}", n);
                return;
            };
            let c = Rc::clone(controller);
            tokio::task::spawn_local(async move {
                match c.speak(&message.id).await {
                    Outcome::Ignored => println!("audio is busy"),
                    Outcome::Failed => print_notices(&c),
                    Outcome::Completed => {}
                }
            });
        }
        Command::Show => print_thread(controller),
        Command::Close => {
            controller.close_chat();
            println!("(no chat open)");
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
        Command::Invalid(line) => println!("unknown command: {} (try /help)", line),
    }
    print_notices(controller);
}

fn spawn_send(controller: &Rc<ConversationController>) {
    let c = Rc::clone(controller);
    tokio::task::spawn_local(async move {
        if c.send().await == Outcome::Failed {
            print_notices(&c);
        }
    });
}

/// Reads commands from stdin and prints the thread as the store pushes it.
/// Must run inside a `LocalSet`.
pub async fn run(controller: Rc<ConversationController>) -> std::io::Result<()> {
    println!("{}", render::header(controller.user_id()));
    println!("Type /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Command::Quit => break,
                    Command::Say(text) if text.trim().is_empty() => continue,
                    command => dispatch(&controller, command),
                }
            }
            update = controller.next_update() => match update {
                SyncUpdate::Replaced(_) => print_thread(&controller),
                SyncUpdate::Failed(_) => {
                    print_notices(&controller);
                    println!("(no chat open)");
                }
                SyncUpdate::Stale => {}
            },
        }
    }

    controller.close_chat();
    log::info!("bye");
    Ok(())
}
