use std::path::Path;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::handlers::commands::{
    describe_outcome, handle_command, parse_command, CommandEffect, HELP_TEXT,
};
use crate::storyboard::error::Result as StoryboardResult;
use crate::storyboard::{AnalysisTicket, Language, SceneAnalysis, SceneAnalyzer, SessionController};

type AnalysisMessage = (AnalysisTicket, StoryboardResult<SceneAnalysis>);

fn spawn_analysis<A>(
    analyzer: &A,
    ticket: AnalysisTicket,
    tx: mpsc::UnboundedSender<AnalysisMessage>,
) where
    A: SceneAnalyzer + Clone + Send + Sync + 'static,
{
    let analyzer = analyzer.clone();
    tokio::spawn(async move {
        let result = analyzer.analyze(ticket.images()).await;
        if tx.send((ticket, result)).is_err() {
            error!("Analysis finished after the session closed");
        }
    });
}

fn finish(session: &mut SessionController, message: AnalysisMessage) {
    let (ticket, result) = message;
    let outcome = session.finish_analysis(ticket, result);
    println!("{}", describe_outcome(session, &outcome));
}

pub async fn run_repl<A>(analyzer: A, language: Language, logs_dir: &Path) -> Result<()>
where
    A: SceneAnalyzer + Clone + Send + Sync + 'static,
{
    let mut session = SessionController::new(language);
    let (tx, mut rx) = mpsc::unbounded_channel::<AnalysisMessage>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Storyboard Matrix: build a 3x3 storyboard grid prompt.");
    println!("{HELP_TEXT}");
    info!("Interactive session started (language={language})");

    loop {
        tokio::select! {
            Some(message) = rx.recv() => finish(&mut session, message),
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let command = match parse_command(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                let reply = match handle_command(&mut session, command, logs_dir).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        println!("Error: {err:#}");
                        continue;
                    }
                };
                if !reply.output.is_empty() {
                    println!("{}", reply.output);
                }
                match reply.effect {
                    CommandEffect::Continue => {}
                    CommandEffect::Analyze(ticket) => {
                        spawn_analysis(&analyzer, ticket, tx.clone());
                    }
                    CommandEffect::Wait => {
                        if let Some(message) = rx.recv().await {
                            finish(&mut session, message);
                        }
                    }
                    CommandEffect::Quit => break,
                }
            }
        }
    }

    if session.is_busy() {
        println!("Waiting for the running analysis to finish...");
        if let Some(message) = rx.recv().await {
            finish(&mut session, message);
        }
    }
    info!("Interactive session closed");
    Ok(())
}
