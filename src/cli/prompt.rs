//! Interactive prompting for counts missing from the command line.

use crate::cli::args::{CountOverrides, parse_positive};
use crate::scheduler::FanoutPlan;
use std::io::{self, BufRead, Write};

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Input ended before {0} was entered")]
    EndOfInput(&'static str),
    #[error("I/O error while prompting: {0}")]
    Io(#[from] io::Error),
}

/// Build the plan from the given counts, asking for each missing one.
pub fn resolve_plan<R, W>(
    counts: CountOverrides,
    input: &mut R,
    output: &mut W,
) -> Result<FanoutPlan, PromptError>
where
    R: BufRead,
    W: Write,
{
    let mut ask = |given: Option<usize>, what: &'static str| match given {
        Some(n) => Ok(n),
        None => prompt_count(input, output, what),
    };

    Ok(FanoutPlan::new(
        ask(counts.organizations, "organizations")?,
        ask(counts.projects, "projects per organization")?,
        ask(counts.applications, "applications per project")?,
        ask(counts.users, "users per organization")?,
    ))
}

/// Ask until a positive integer is entered.
pub fn prompt_count<R, W>(input: &mut R, output: &mut W, what: &'static str) -> Result<usize, PromptError>
where
    R: BufRead,
    W: Write,
{
    loop {
        write!(output, "Enter number of {}: ", what)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(PromptError::EndOfInput(what));
        }

        match parse_positive(&line) {
            Ok(n) => return Ok(n),
            Err(e) => writeln!(output, "Invalid number of {}: {}", what, e)?,
        }
    }
}
