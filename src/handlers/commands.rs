use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::llm::load_image_files;
use crate::storyboard::{
    AnalysisOutcome, AnalysisStart, AnalysisTicket, Language, SessionController, SHOT_TYPES,
};
use crate::utils::logging::read_recent_log_lines;

const DEFAULT_LOG_TAIL_LINES: usize = 20;
const ANALYSIS_HINT: &str =
    "* Load images and run `analyze` to automatically fill the scene description.";

pub const HELP_TEXT: &str = "Commands:
  images <path>...   replace the reference images
  analyze            extract the scene description from the images
  wait               block until a running analysis finishes
  cell <1-9>         select a grid cell for editing
  shot <id>          assign a shot type to the selected cell
  shots              list the available shot types
  grid               show the 3x3 shot grid
  lang <cn|en>       switch the output language
  prompt             print the final prompt
  copy [file]        print the prompt for copying, or write it to a file
  status             show the session state
  reset              clear images, scene description and grid
  logs [n]           show the last log lines
  help               show this help
  quit               exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Images(Vec<PathBuf>),
    Analyze,
    Wait,
    Cell(usize),
    Shot(String),
    Shots,
    Grid,
    Lang(Language),
    Prompt,
    Copy(Option<PathBuf>),
    Status,
    Reset,
    Logs(usize),
    Quit,
}

#[derive(Debug)]
pub enum CommandEffect {
    Continue,
    Analyze(AnalysisTicket),
    Wait,
    Quit,
}

#[derive(Debug)]
pub struct CommandReply {
    pub output: String,
    pub effect: CommandEffect,
}

impl CommandReply {
    fn text(output: impl Into<String>) -> Self {
        CommandReply {
            output: output.into(),
            effect: CommandEffect::Continue,
        }
    }
}

/// Parses one REPL line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ReplCommand>> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match name.to_lowercase().as_str() {
        "help" | "?" => ReplCommand::Help,
        "images" | "image" => {
            ReplCommand::Images(args.iter().map(PathBuf::from).collect())
        }
        "analyze" | "analyse" => ReplCommand::Analyze,
        "wait" => ReplCommand::Wait,
        "cell" => {
            let value = args
                .first()
                .ok_or_else(|| anyhow!("Usage: cell <1-9>"))?;
            let number = value
                .parse::<usize>()
                .map_err(|_| anyhow!("Invalid cell number: {value}"))?;
            let index = number
                .checked_sub(1)
                .ok_or_else(|| anyhow!("Cell numbers start at 1"))?;
            ReplCommand::Cell(index)
        }
        "shot" => {
            let value = args
                .first()
                .ok_or_else(|| anyhow!("Usage: shot <id> (see `shots`)"))?;
            ReplCommand::Shot(value.to_string())
        }
        "shots" => ReplCommand::Shots,
        "grid" => ReplCommand::Grid,
        "lang" | "language" => {
            let value = args
                .first()
                .ok_or_else(|| anyhow!("Usage: lang <cn|en>"))?;
            ReplCommand::Lang(value.parse::<Language>()?)
        }
        "prompt" => ReplCommand::Prompt,
        "copy" => ReplCommand::Copy(args.first().map(PathBuf::from)),
        "status" => ReplCommand::Status,
        "reset" => ReplCommand::Reset,
        "logs" => {
            let lines = match args.first() {
                Some(value) => value
                    .parse::<usize>()
                    .map_err(|_| anyhow!("Invalid line count: {value}"))?,
                None => DEFAULT_LOG_TAIL_LINES,
            };
            ReplCommand::Logs(lines)
        }
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => return Err(anyhow!("Unknown command: {other}. Type `help` for a list.")),
    };
    Ok(Some(command))
}

fn prompt_with_hint(session: &SessionController) -> Result<String> {
    let mut text = session.prompt()?;
    if session.needs_analysis_hint() {
        text.push('\n');
        text.push_str(ANALYSIS_HINT);
    }
    Ok(text)
}

fn shots_listing(language: Language) -> String {
    SHOT_TYPES
        .iter()
        .map(|shot| format!("  {:<16} {}", shot.id, shot.label(language)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn status_text(session: &SessionController) -> String {
    let selected = session
        .selected_cell()
        .map(|cell| format!("{:02}", cell + 1))
        .unwrap_or_else(|| "none".to_string());
    let mut lines = vec![
        format!("Language: {}", session.language()),
        format!("Images: {}", session.images().len()),
        format!(
            "Analysis: {}",
            if session.is_busy() { "running" } else { "idle" }
        ),
        format!(
            "Scene description: {}",
            if session.scene().is_empty() {
                "missing"
            } else {
                "present"
            }
        ),
        format!("Selected cell: {selected}"),
        format!(
            "Grid: {}",
            session
                .grid()
                .iter()
                .map(|(_, id)| id)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        format!("Copied: {}", if session.is_copied() { "yes" } else { "no" }),
    ];
    for preview in session.previews() {
        lines.push(format!("  - {}", preview.describe()));
    }
    lines.join("\n")
}

fn logs_text(logs_dir: &Path, max_lines: usize) -> Result<String> {
    let tail = read_recent_log_lines(logs_dir, "storyboard.log", max_lines)
        .with_context(|| format!("Failed to read logs from {}", logs_dir.display()))?;
    Ok(match tail {
        Some(tail) => format!("{}:\n{}", tail.path.display(), tail.lines.join("\n")),
        None => "No log lines available.".to_string(),
    })
}

/// Applies one command to the session. Analysis is not awaited here; a
/// started analysis is handed back as [`CommandEffect::Analyze`].
pub async fn handle_command(
    session: &mut SessionController,
    command: ReplCommand,
    logs_dir: &Path,
) -> Result<CommandReply> {
    let reply = match command {
        ReplCommand::Help => CommandReply::text(HELP_TEXT),
        ReplCommand::Images(paths) => {
            let images = load_image_files(&paths).await?;
            session.select_images(images);
            let mut lines = vec![format!("Selected {} image(s).", session.images().len())];
            lines.extend(
                session
                    .previews()
                    .iter()
                    .map(|preview| format!("  - {}", preview.describe())),
            );
            CommandReply::text(lines.join("\n"))
        }
        ReplCommand::Analyze => match session.begin_analysis() {
            AnalysisStart::NoImages => {
                CommandReply::text("No images selected. Use `images <path>...` first.")
            }
            AnalysisStart::Busy => CommandReply::text("Analysis is already running."),
            AnalysisStart::Started(ticket) => CommandReply {
                output: format!("Analyzing {} image(s)...", ticket.images().len()),
                effect: CommandEffect::Analyze(ticket),
            },
        },
        ReplCommand::Wait => {
            if session.is_busy() {
                CommandReply {
                    output: "Waiting for analysis...".to_string(),
                    effect: CommandEffect::Wait,
                }
            } else {
                CommandReply::text("No analysis is running.")
            }
        }
        ReplCommand::Cell(index) => {
            session.select_cell(index)?;
            CommandReply::text(session.render_palette()?)
        }
        ReplCommand::Shot(shot_id) => {
            if session.choose_shot(&shot_id)? {
                CommandReply::text(session.render_grid()?)
            } else {
                CommandReply::text("Select a cell first with `cell <1-9>`.")
            }
        }
        ReplCommand::Shots => CommandReply::text(shots_listing(session.language())),
        ReplCommand::Grid => CommandReply::text(format!(
            "{}\n\n{}",
            session.render_grid()?,
            session.render_palette()?
        )),
        ReplCommand::Lang(language) => {
            session.set_language(language);
            CommandReply::text(format!("Output language: {language}"))
        }
        ReplCommand::Prompt => CommandReply::text(prompt_with_hint(session)?),
        ReplCommand::Copy(target) => match target {
            Some(path) => {
                let prompt = session.prompt()?;
                tokio::fs::write(&path, prompt.as_bytes())
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                session.mark_copied();
                info!("Prompt written to {}", path.display());
                CommandReply::text(format!("Copied prompt to {}", path.display()))
            }
            None => CommandReply::text(session.copy_prompt()?),
        },
        ReplCommand::Status => CommandReply::text(status_text(session)),
        ReplCommand::Reset => {
            session.reset();
            CommandReply::text("Session reset.")
        }
        ReplCommand::Logs(max_lines) => CommandReply::text(logs_text(logs_dir, max_lines)?),
        ReplCommand::Quit => CommandReply {
            output: String::new(),
            effect: CommandEffect::Quit,
        },
    };
    Ok(reply)
}

pub fn describe_outcome(session: &SessionController, outcome: &AnalysisOutcome) -> String {
    match outcome {
        AnalysisOutcome::Applied => {
            let scene = session.scene();
            format!(
                "Scene analysis complete.\n  CN: {}\n  EN: {}",
                scene.cn, scene.en
            )
        }
        AnalysisOutcome::Failed(err) => {
            warn!("Reporting analysis failure to user: {err}");
            format!("Failed to analyze images. Please check your API key and try again. ({err})")
        }
        AnalysisOutcome::Discarded => {
            "Analysis finished after a reset; the result was discarded.".to_string()
        }
        AnalysisOutcome::NoImages => "No images selected.".to_string(),
        AnalysisOutcome::Busy => "Analysis is already running.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::media::sample_png;
    use crate::storyboard::error::StoryboardError;
    use crate::storyboard::SceneAnalysis;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("cell 3").unwrap(), Some(ReplCommand::Cell(2)));
        assert_eq!(
            parse_command("SHOT close_up").unwrap(),
            Some(ReplCommand::Shot("close_up".to_string()))
        );
        assert_eq!(
            parse_command("lang en").unwrap(),
            Some(ReplCommand::Lang(Language::En))
        );
        assert_eq!(
            parse_command("images a.png b.jpg").unwrap(),
            Some(ReplCommand::Images(vec![
                PathBuf::from("a.png"),
                PathBuf::from("b.jpg")
            ]))
        );
        assert_eq!(parse_command("copy").unwrap(), Some(ReplCommand::Copy(None)));
        assert_eq!(
            parse_command("logs").unwrap(),
            Some(ReplCommand::Logs(DEFAULT_LOG_TAIL_LINES))
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_command("cell 0").is_err());
        assert!(parse_command("cell x").is_err());
        assert!(parse_command("cell").is_err());
        assert!(parse_command("lang fr").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[tokio::test]
    async fn edits_grid_through_commands() {
        let logs = tempfile::tempdir().unwrap();
        let mut session = SessionController::new(Language::En);

        let reply = handle_command(&mut session, ReplCommand::Shot("wide".into()), logs.path())
            .await
            .unwrap();
        assert!(reply.output.contains("Select a cell first"));

        handle_command(&mut session, ReplCommand::Cell(0), logs.path())
            .await
            .unwrap();
        let reply = handle_command(&mut session, ReplCommand::Shot("wide".into()), logs.path())
            .await
            .unwrap();
        assert!(reply.output.contains(">01 Wide Shot"));

        let reply = handle_command(&mut session, ReplCommand::Prompt, logs.path())
            .await
            .unwrap();
        assert!(reply
            .output
            .contains("Shot 01: Wide Shot, showing character within environment"));
        assert!(reply.output.ends_with(ANALYSIS_HINT));

        let err = handle_command(&mut session, ReplCommand::Cell(9), logs.path())
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoryboardError>(),
            Some(&StoryboardError::InvalidCellIndex(9))
        );
    }

    #[tokio::test]
    async fn analyze_requires_images_and_hands_back_a_ticket() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = SessionController::new(Language::Cn);

        let reply = handle_command(&mut session, ReplCommand::Analyze, dir.path())
            .await
            .unwrap();
        assert!(matches!(reply.effect, CommandEffect::Continue));
        assert!(!session.is_busy());

        let path = dir.path().join("ref.png");
        std::fs::write(&path, sample_png(3, 2)).unwrap();
        let reply = handle_command(&mut session, ReplCommand::Images(vec![path]), dir.path())
            .await
            .unwrap();
        assert!(reply.output.contains("3x2"));

        let reply = handle_command(&mut session, ReplCommand::Analyze, dir.path())
            .await
            .unwrap();
        let CommandEffect::Analyze(ticket) = reply.effect else {
            panic!("expected analysis ticket");
        };
        assert!(session.is_busy());

        let again = handle_command(&mut session, ReplCommand::Analyze, dir.path())
            .await
            .unwrap();
        assert_eq!(again.output, "Analysis is already running.");

        let outcome = session.finish_analysis(
            ticket,
            Ok(SceneAnalysis {
                cn: "灯塔".to_string(),
                en: "A lighthouse".to_string(),
            }),
        );
        assert!(describe_outcome(&session, &outcome).contains("A lighthouse"));
    }

    #[tokio::test]
    async fn failed_image_load_keeps_previous_images() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        std::fs::write(&good, sample_png(1, 1)).unwrap();
        let mut session = SessionController::new(Language::Cn);
        handle_command(&mut session, ReplCommand::Images(vec![good]), dir.path())
            .await
            .unwrap();

        let missing = dir.path().join("missing.png");
        let result =
            handle_command(&mut session, ReplCommand::Images(vec![missing]), dir.path()).await;
        assert!(result.is_err());
        assert_eq!(session.images().len(), 1);
    }

    #[tokio::test]
    async fn copy_writes_prompt_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("prompt.txt");
        let mut session = SessionController::new(Language::Cn);

        let reply = handle_command(
            &mut session,
            ReplCommand::Copy(Some(target.clone())),
            dir.path(),
        )
        .await
        .unwrap();

        assert!(reply.output.starts_with("Copied prompt to"));
        let written = std::fs::read_to_string(&target).unwrap();
        assert_eq!(written, session.prompt().unwrap());
        assert!(session.is_copied());
    }

    #[tokio::test]
    async fn failed_copy_leaves_marker_unset() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("no_such_dir").join("prompt.txt");
        let mut session = SessionController::new(Language::En);

        let result =
            handle_command(&mut session, ReplCommand::Copy(Some(target)), dir.path()).await;

        assert!(result.is_err());
        assert!(!session.is_copied());
    }
}
