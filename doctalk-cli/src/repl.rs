//! The interactive chat loop.

use std::path::PathBuf;

use anyhow::{Context, bail};
use doctalk_session::DocChat;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const HELP: &str = "\
Commands:
  /sources          list the uploaded files
  /export [PATH]    write the session transcript as JSON (stdout if no path)
  /help             show this message
  /quit             end the session and exit
Anything else is sent as a question.";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A question or request for the documents.
    Ask(String),
    /// List the uploaded files.
    Sources,
    /// Export the transcript.
    Export(Option<PathBuf>),
    /// Print the command list.
    Help,
    /// Leave the loop.
    Quit,
    /// Nothing to do.
    Empty,
}

impl Command {
    /// Interpret a line typed at the prompt.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        match head {
            "/sources" => Self::Sources,
            "/export" if rest.is_empty() => Self::Export(None),
            "/export" => Self::Export(Some(PathBuf::from(rest))),
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Ask(line.to_string()),
        }
    }
}

/// What the line reader hands to the chat loop.
#[derive(Debug)]
enum Input {
    Line(String),
    End,
    Failed(String),
}

/// Run the line editor on a blocking thread.
///
/// The reader prompts again only after the loop acknowledges the previous
/// line on `ready`, so answers are never interleaved with the prompt. It
/// stops once either channel closes.
fn spawn_reader(
    lines: mpsc::Sender<Input>,
    mut ready: mpsc::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let message = format!("failed to initialize line editor: {e}");
                let _ = lines.blocking_send(Input::Failed(message));
                return;
            }
        };

        loop {
            let input = match editor.readline("doctalk> ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = editor.add_history_entry(line.as_str());
                    }
                    Input::Line(line)
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => Input::End,
                Err(e) => Input::Failed(format!("failed to read input: {e}")),
            };
            let done = !matches!(input, Input::Line(_));
            if lines.blocking_send(input).is_err() || done || ready.blocking_recv().is_none() {
                break;
            }
        }
        debug!("line reader stopped");
    })
}

/// Read lines until `/quit` or end of input, answering each question.
///
/// Errors from a single turn are printed and the loop continues; only an
/// expired or missing session ends it.
pub async fn run(chat: &DocChat, session_id: &str) -> anyhow::Result<()> {
    println!("Type a question, or /help for commands.");

    let (line_tx, mut line_rx) = mpsc::channel(1);
    let (ready_tx, ready_rx) = mpsc::channel(1);
    let reader = spawn_reader(line_tx, ready_rx);

    let result = chat_loop(chat, session_id, &mut line_rx, &ready_tx).await;

    // The reader is waiting for an acknowledgement or has already stopped.
    drop(ready_tx);
    drop(line_rx);
    reader.await.context("line reader panicked")?;
    result
}

async fn chat_loop(
    chat: &DocChat,
    session_id: &str,
    lines: &mut mpsc::Receiver<Input>,
    ready: &mpsc::Sender<()>,
) -> anyhow::Result<()> {
    while let Some(input) = lines.recv().await {
        let line = match input {
            Input::Line(line) => line,
            Input::End => break,
            Input::Failed(message) => bail!(message),
        };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Sources => {
                let snapshot = chat.snapshot(session_id).await?;
                for name in &snapshot.document_names {
                    println!("  {name}");
                }
            }
            Command::Export(path) => {
                let snapshot = chat.snapshot(session_id).await?;
                let json = serde_json::to_string_pretty(&snapshot)?;
                match path {
                    Some(path) => {
                        std::fs::write(&path, json)
                            .with_context(|| format!("failed to write {}", path.display()))?;
                        println!("Transcript written to {}", path.display());
                    }
                    None => println!("{json}"),
                }
            }
            Command::Ask(message) => match chat.chat(session_id, &message).await {
                Ok(reply) => {
                    println!("\n{}\n", reply.answer);
                    if !reply.sources.is_empty() {
                        println!("Sources: {}\n", reply.sources.join(", "));
                    }
                }
                Err(e) if e.is_not_found() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "chat turn failed");
                    eprintln!("error: {e}");
                }
            },
        }

        if ready.send(()).await.is_err() {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use doctalk_rag::{Document, HashingEmbedder};
    use doctalk_session::ExtractiveSynthesizer;

    use super::*;

    async fn chat_with_geography() -> (DocChat, String) {
        let chat = DocChat::builder()
            .embedder(Arc::new(HashingEmbedder::default()))
            .synthesizer(Arc::new(ExtractiveSynthesizer::new()))
            .build()
            .unwrap();
        let receipt =
            chat.upload(vec![Document::new("geo.txt", "Paris is the capital of France.")]).await.unwrap();
        (chat, receipt.session_id)
    }

    async fn feed(inputs: Vec<Input>) -> (mpsc::Receiver<Input>, mpsc::Sender<()>, mpsc::Receiver<()>) {
        let (line_tx, line_rx) = mpsc::channel(inputs.len().max(1));
        for input in inputs {
            line_tx.send(input).await.unwrap();
        }
        let (ready_tx, ready_rx) = mpsc::channel(8);
        (line_rx, ready_tx, ready_rx)
    }

    #[tokio::test]
    async fn loop_acknowledges_every_handled_line() {
        let (chat, session_id) = chat_with_geography().await;
        let (mut lines, ready_tx, mut ready_rx) = feed(vec![
            Input::Line("What is the capital of France?".into()),
            Input::Line("/help".into()),
            Input::Line("   ".into()),
            Input::End,
        ])
        .await;

        chat_loop(&chat, &session_id, &mut lines, &ready_tx).await.unwrap();

        for _ in 0..3 {
            ready_rx.try_recv().unwrap();
        }
        assert!(ready_rx.try_recv().is_err());
        assert_eq!(chat.snapshot(&session_id).await.unwrap().history.len(), 1);
    }

    #[tokio::test]
    async fn quit_stops_before_later_lines() {
        let (chat, session_id) = chat_with_geography().await;
        let (mut lines, ready_tx, mut ready_rx) =
            feed(vec![Input::Line("/quit".into()), Input::Line("capital?".into())]).await;

        chat_loop(&chat, &session_id, &mut lines, &ready_tx).await.unwrap();

        assert!(ready_rx.try_recv().is_err());
        assert!(chat.snapshot(&session_id).await.unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn reader_failure_ends_the_loop() {
        let (chat, session_id) = chat_with_geography().await;
        let (mut lines, ready_tx, _ready_rx) =
            feed(vec![Input::Failed("failed to read input: broken pipe".into())]).await;

        let err = chat_loop(&chat, &session_id, &mut lines, &ready_tx).await.unwrap_err();
        assert!(err.to_string().contains("broken pipe"));
    }

    #[test]
    fn slash_commands_are_recognized() {
        assert_eq!(Command::parse("/sources"), Command::Sources);
        assert_eq!(Command::parse("  /quit "), Command::Quit);
        assert_eq!(Command::parse("/exit"), Command::Quit);
        assert_eq!(Command::parse("/help"), Command::Help);
        assert_eq!(Command::parse("/export"), Command::Export(None));
        assert_eq!(
            Command::parse("/export  out/chat.json"),
            Command::Export(Some(PathBuf::from("out/chat.json")))
        );
    }

    #[test]
    fn everything_else_is_a_question() {
        assert_eq!(Command::parse("what is /sources?"), Command::Ask("what is /sources?".into()));
        assert_eq!(Command::parse("/unknown thing"), Command::Ask("/unknown thing".into()));
        assert_eq!(Command::parse("   "), Command::Empty);
    }
}
