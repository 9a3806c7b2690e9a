use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::llm::load_image_files;
use crate::storyboard::{
    AnalysisOutcome, Language, SceneAnalysis, SceneAnalyzer, SessionController,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeArgs {
    pub images: Vec<PathBuf>,
    pub language: Language,
    pub scene_cn: Option<String>,
    pub scene_en: Option<String>,
    /// Zero-based cell index and shot id, applied in order.
    pub cells: Vec<(usize, String)>,
    pub analyze: bool,
    pub out: Option<PathBuf>,
}

pub fn compose_usage() -> &'static str {
    "Usage: storyboard_matrix compose [--image <path>]... [--lang <cn|en>] [--scene-cn <text>] [--scene-en <text>] [--cell <1-9>=<shot_id>]... [--analyze] [--out <file>]"
}

fn parse_cell_assignment(value: &str) -> Result<(usize, String)> {
    let (cell, shot_id) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid --cell value: {value} (expected <1-9>=<shot_id>)"))?;
    let number = cell
        .trim()
        .parse::<usize>()
        .map_err(|_| anyhow!("Invalid cell number in --cell {value}"))?;
    let index = number
        .checked_sub(1)
        .ok_or_else(|| anyhow!("Cell numbers start at 1 in --cell {value}"))?;
    Ok((index, shot_id.trim().to_string()))
}

pub fn parse_compose_args(
    args: &[String],
    default_language: Language,
) -> Result<Option<ComposeArgs>> {
    if args.get(1).map(|value| value.as_str()) != Some("compose") {
        return Ok(None);
    }

    let mut parsed = ComposeArgs {
        images: Vec::new(),
        language: default_language,
        scene_cn: None,
        scene_en: None,
        cells: Vec::new(),
        analyze: false,
        out: None,
    };

    let mut index = 2;
    while index < args.len() {
        let flag = args[index].as_str();
        let mut value = || {
            index += 1;
            args.get(index)
                .cloned()
                .ok_or_else(|| anyhow!("Missing value for {flag}"))
        };
        match flag {
            "--image" | "-i" => parsed.images.push(PathBuf::from(value()?)),
            "--lang" | "-l" => parsed.language = value()?.parse::<Language>()?,
            "--scene-cn" => parsed.scene_cn = Some(value()?),
            "--scene-en" => parsed.scene_en = Some(value()?),
            "--cell" | "-c" => parsed.cells.push(parse_cell_assignment(&value()?)?),
            "--out" | "-o" => parsed.out = Some(PathBuf::from(value()?)),
            "--analyze" => parsed.analyze = true,
            "--help" | "-h" => return Err(anyhow!(compose_usage())),
            other => {
                return Err(anyhow!(
                    "Unknown compose argument: {other}\n{}",
                    compose_usage()
                ))
            }
        }
        index += 1;
    }

    if parsed.analyze && parsed.images.is_empty() {
        return Err(anyhow!("--analyze needs at least one --image"));
    }

    Ok(Some(parsed))
}

/// Builds a session from command-line arguments and returns the prompt. The
/// prompt is also written to `--out` when given.
pub async fn run_compose<A: SceneAnalyzer>(args: ComposeArgs, analyzer: &A) -> Result<String> {
    let mut session = SessionController::new(args.language);

    if !args.images.is_empty() {
        session.select_images(load_image_files(&args.images).await?);
    }

    if args.scene_cn.is_some() || args.scene_en.is_some() {
        session.set_scene(SceneAnalysis {
            cn: args.scene_cn.unwrap_or_default(),
            en: args.scene_en.unwrap_or_default(),
        });
    }

    if args.analyze {
        match session.start_analysis(analyzer).await {
            AnalysisOutcome::Applied => info!("Scene description filled from analysis"),
            AnalysisOutcome::Failed(err) => return Err(err.into()),
            other => return Err(anyhow!("Analysis did not run: {other:?}")),
        }
    }

    for (cell, shot_id) in &args.cells {
        session.select_cell(*cell)?;
        session.choose_shot(shot_id)?;
    }

    let prompt = session.prompt()?;
    if let Some(path) = &args.out {
        tokio::fs::write(path, prompt.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Prompt written to {}", path.display());
    }
    session.mark_copied();
    Ok(prompt)
}
