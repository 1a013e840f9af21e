use clap::Parser;
use cited_chat::cli::ClientArgs;
use cited_chat::client::{ ChatSession, StreamOutcome };
use cited_chat::models::stream::StreamProtocol;
use dotenv::dotenv;
use std::error::Error;
use std::io::Write;
use tokio::io::{ AsyncBufReadExt, BufReader };

const HELP: &str = "Commands: /new, /inspect <n>, /history, /quit";

fn print_suggestions(session: &ChatSession) {
    let suggestions = session.suggestions();
    if suggestions.is_empty() {
        return;
    }
    println!("Try one of these (type its number):");
    for (i, s) in suggestions.iter().enumerate() {
        println!("  {}. {}", i + 1, s);
    }
}

fn print_sources(answer: &str) {
    let sources = ChatSession::citations(answer);
    if sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for (index, url) in sources {
        println!("  [{}] {}", index, url);
    }
}

fn print_history(session: &ChatSession) {
    if session.messages().is_empty() {
        println!("(empty conversation)");
    }
    for (i, turn) in session.messages().iter().enumerate() {
        let preview: String = turn.content.chars().take(72).collect();
        println!("{:>3}. {:<9} {}", i + 1, turn.role, preview.replace('\n', " "));
    }
}

async fn ask(session: &mut ChatSession, input: Ask<'_>) {
    let mut stdout = std::io::stdout();
    let on_fragment = |fragment: &str| {
        print!("{}", fragment);
        let _ = stdout.flush();
    };
    let result = match input {
        Ask::Text(text) => session.send(text, on_fragment).await,
        Ask::Suggestion(index) => session.send_suggestion(index, on_fragment).await,
    };
    match result {
        Ok(StreamOutcome::Complete) => {
            println!();
            if let Some(answer) = session.messages().last() {
                print_sources(&answer.content);
            }
        }
        Ok(StreamOutcome::Interrupted(reason)) => {
            println!("\n[answer interrupted: {}]", reason);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
        }
    }
}

enum Ask<'a> {
    Text(&'a str),
    Suggestion(usize),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = ClientArgs::parse();

    let protocol: StreamProtocol = args.stream_protocol.parse()?;
    let mut session = ChatSession::new(&args.endpoint, protocol)?;

    println!("Connected to {} ({} stream)", session.endpoint(), protocol);
    println!("{}", HELP);
    print_suggestions(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/new" => {
                session.new_chat();
                println!("Started a new conversation.");
                print_suggestions(&session);
            }
            "/history" => print_history(&session),
            _ if line.starts_with("/inspect") => {
                let arg = line.trim_start_matches("/inspect").trim();
                match arg.parse::<usize>() {
                    Ok(n) if n >= 1 =>
                        match session.inspect(n - 1) {
                            Ok(json) => println!("{}", json),
                            Err(e) => eprintln!("Error: {}", e),
                        }
                    _ => eprintln!("Usage: /inspect <n> (see /history)"),
                }
            }
            _ if line.starts_with('/') => println!("{}", HELP),
            _ => {
                let pick = line
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n >= 1 && *n <= session.suggestions().len());
                match pick {
                    Some(n) => {
                        println!("{}", session.suggestions()[n - 1]);
                        ask(&mut session, Ask::Suggestion(n - 1)).await;
                    }
                    None => ask(&mut session, Ask::Text(line)).await,
                }
            }
        }
    }

    Ok(())
}
