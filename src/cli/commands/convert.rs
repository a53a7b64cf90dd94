//! Convert command: merge predictions into a submission template.

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::error::Result;
use crate::predict::{convert_results, read_predictions};
use std::path::Path;

pub fn run_convert(
    predictions: &Path,
    template: &Path,
    output: &Path,
    level: LogLevel,
) -> Result<()> {
    let records = read_predictions(predictions)?;
    let filled = convert_results(template, &records, output)?;
    log(
        level,
        LogLevel::Normal,
        &format!(
            "Filled {filled} of {} template record(s) into {}",
            records.len(),
            output.display()
        ),
    );
    Ok(())
}
