//! Artifact queue commands.

use anyhow::Result;

use pinboard::Pinboard;
use pinboard::artifacts::ArtifactCommand;
use pinboard::ui::print_error_box;

use super::print_json;

pub async fn drain(board: &Pinboard) -> Result<()> {
    let report = board.queue().drain().await?;
    println!(
        "Applied {} request(s), {} failed",
        report.applied, report.dead_lettered
    );
    Ok(())
}

pub fn failures(board: &Pinboard, json: bool) -> Result<()> {
    let failures = board.pins().image_failures()?;
    if json {
        return print_json(&failures);
    }
    if failures.is_empty() {
        println!("No failed image operations");
        return Ok(());
    }

    for failure in &failures {
        let state = match (failure.command, failure.still_referenced) {
            (ArtifactCommand::Save, true) => "image not stored",
            (ArtifactCommand::Save, false) => "no longer used",
            (ArtifactCommand::Delete, _) => "file left on disk",
        };
        println!(
            "#{:<5} {:<6} pin {} {} ({state}, {} attempt(s)): {}",
            failure.sequence,
            failure.command.as_str(),
            failure.pin_id,
            failure.filename,
            failure.attempts,
            failure.reason.as_deref().unwrap_or("unknown error")
        );
    }
    println!("\nRetry with `pinboard retry <#>` or drop with `pinboard retry <#> --discard`");
    Ok(())
}

pub async fn retry(board: &Pinboard, sequence: i64, discard: bool) -> Result<()> {
    if discard {
        if !board.queue().discard_dead_letter(sequence)? {
            anyhow::bail!("No failed request #{sequence}");
        }
        println!("Discarded request #{sequence}");
        return Ok(());
    }

    if !board.queue().retry_dead_letter(sequence)? {
        anyhow::bail!("No failed request #{sequence}");
    }
    // The background worker may get to it first, so look at the outcome.
    board.queue().drain().await?;
    let failed_again = board
        .queue()
        .dead_letters()?
        .iter()
        .any(|r| r.sequence == sequence);
    if failed_again {
        println!("Request #{sequence} failed again; see `pinboard failures`");
    } else {
        println!("Request #{sequence} applied");
    }
    Ok(())
}

pub fn audit(board: &Pinboard) -> Result<()> {
    let violations = board.audit()?;
    if violations.is_empty() {
        println!("All pin images are stored or queued");
        return Ok(());
    }

    let lines: Vec<String> = violations.iter().map(ToString::to_string).collect();
    print_error_box("Image consistency violations", &lines);
    anyhow::bail!("{} consistency violation(s) found", violations.len())
}
