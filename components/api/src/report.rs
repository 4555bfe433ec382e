//! Plain text rendering of a [`Diagnosis`] for the terminal.

use std::fmt;

use leafpostprocessor::Catalog;
use mltypes::Classifications;

use crate::Diagnosis;

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Prediction: {}", self.label)?;
        writeln!(f, "Confidence: {:.2}%", self.confidence * 100.0)?;

        match &self.info {
            Some(info) => {
                writeln!(f, "\nAbout the disease\n  {}", info.description)?;
                section(f, "Symptoms", &info.symptoms)?;
                section(f, "Causes", &info.causes)?;
                section(f, "Step-by-step solution", &info.solutions)?;
                section(f, "Future prevention tips", &info.prevention)
            }
            None if self.healthy => {
                writeln!(f, "\nThe leaf looks healthy.")?;
                section(f, "Keep it that way", &self.advice)
            }
            None => Ok(()),
        }
    }
}

/// Numbered list of ranked classes.
pub struct Ranking<'a>(pub &'a Classifications);

impl fmt::Display for Ranking<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (rank, c) in self.0.iter().enumerate() {
            writeln!(f, "{}. {} ({:.2}%)", rank + 1, c.label, c.probability * 100.0)?;
        }
        Ok(())
    }
}

/// Tab separated `index  healthy|disease  label` lines in output order.
pub struct Labels<'a>(pub &'a Catalog);

impl fmt::Display for Labels<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, class) in self.0.iter().enumerate() {
            let state = if class.healthy { "healthy" } else { "disease" };
            writeln!(f, "{}\t{}\t{}", index, state, class.label)?;
        }
        Ok(())
    }
}

fn section(f: &mut fmt::Formatter<'_>, title: &str, lines: &[String]) -> fmt::Result {
    if lines.is_empty() {
        return Ok(());
    }
    writeln!(f, "\n{}", title)?;
    for line in lines {
        writeln!(f, "  - {}", line)?;
    }
    Ok(())
}
