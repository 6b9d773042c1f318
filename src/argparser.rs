//! Positional + short-option command-line parser.
//!
//! Grounded in `original_source/amuopt.c`/`amuopt.h`: a single pass over
//! `argv`, classifying each argument as either an option (led by `-`,
//! looked up in a control string of legal letters, some of which
//! consume the next token as a value) or a positional argument
//! (counted in the order seen). Reimplemented as a plain struct over an
//! owned `Vec<String>` rather than the original's static-local iterator
//! state, since Rust has no equivalent of file-scope `static int nextc`
//! without reaching for a `OnceCell`.
//!
//! # Examples
//!
//! ```
//! use marcconv_rs::argparser::CliOptions;
//!
//! let args = ["marcconv", "-e10", "in.mrc", "out.mrc"]
//!     .iter()
//!     .map(ToString::to_string);
//! let opts = CliOptions::parse(args).unwrap();
//! assert_eq!(opts.max_errors, 10);
//! assert_eq!(opts.infile, "in.mrc");
//! ```

use std::fmt;

/// A single parsed option: its letter and, if the control string marks
/// it value-taking, the attached or following value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedOption {
    letter: char,
    value: Option<String>,
}

/// An error produced while walking the argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    /// `-x` where `x` is not one of the letters in the control string.
    UnrecognizedOption(char),
    /// An option that requires a value had none available.
    MissingArgument(char),
    /// Too few positional arguments were given.
    InsufficientArguments,
    /// `-?` or `-h` was given; not a failure, just "print usage and exit 0".
    UsageRequested,
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgError::UnrecognizedOption(c) => write!(f, "unrecognized option '-{c}'"),
            ArgError::MissingArgument(c) => write!(f, "missing required argument for option '-{c}'"),
            ArgError::InsufficientArguments => write!(f, "insufficient arguments"),
            ArgError::UsageRequested => write!(f, "usage requested"),
        }
    }
}

impl std::error::Error for ArgError {}

/// Control string for this program's exact option surface: `a` takes no
/// value, the rest take one.
const OPTION_LETTERS_WITH_VALUE: &[char] = &['e', 'l', 'n', 'p', 's'];
const OPTION_LETTERS_NO_VALUE: &[char] = &['a'];
const USAGE_LETTERS: &[char] = &['?', 'h'];

fn takes_value(c: char) -> bool {
    OPTION_LETTERS_WITH_VALUE.contains(&c)
}

fn is_known_option(c: char) -> bool {
    takes_value(c) || OPTION_LETTERS_NO_VALUE.contains(&c) || USAGE_LETTERS.contains(&c)
}

/// Walks `argv[1..]`, splitting it into options and positional
/// arguments in a single left-to-right pass.
fn split_args(args: &[String]) -> Result<(Vec<ParsedOption>, Vec<String>), ArgError> {
    let mut options = Vec::new();
    let mut positionals = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let mut chars = arg.chars();
        if chars.next() == Some('-') && arg.len() > 1 {
            let letter = chars.next().unwrap();
            if USAGE_LETTERS.contains(&letter) {
                return Err(ArgError::UsageRequested);
            }
            if !is_known_option(letter) {
                return Err(ArgError::UnrecognizedOption(letter));
            }
            if takes_value(letter) {
                let rest = &arg[2..];
                if !rest.is_empty() {
                    options.push(ParsedOption { letter, value: Some(rest.to_string()) });
                } else {
                    i += 1;
                    let Some(next) = args.get(i) else {
                        return Err(ArgError::MissingArgument(letter));
                    };
                    if next.starts_with('-') && next.len() > 1 {
                        return Err(ArgError::MissingArgument(letter));
                    }
                    options.push(ParsedOption { letter, value: Some(next.clone()) });
                }
            } else {
                options.push(ParsedOption { letter, value: None });
            }
        } else {
            positionals.push(arg.clone());
        }
        i += 1;
    }
    Ok((options, positionals))
}

/// Fully parsed command-line invocation: `prog [options] infile outfile
/// [ctlfile [switchfile]]`.
#[derive(Debug, Clone)]
pub struct CliOptions {
    /// Input MARC file path.
    pub infile: String,
    /// Output MARC file path.
    pub outfile: String,
    /// Control-table file path, if given.
    pub ctlfile: Option<String>,
    /// Switch file path, if given.
    pub switchfile: Option<String>,
    /// `-a`: append to the output file instead of truncating it.
    pub append: bool,
    /// `-e<n>`: maximum compile/run errors before escalating to fatal.
    pub max_errors: u32,
    /// `-l<path>`: log file path.
    pub log_path: String,
    /// `-n<n>`: maximum number of records to convert.
    pub max_records: Option<u64>,
    /// `-p<path>`: alternate directory to search for control tables.
    pub ctl_search_path: Option<String>,
    /// `-s<n>`: number of leading input records to skip untouched.
    pub skip_records: u64,
}

const DEFAULT_MAX_ERRORS: u32 = 50;
const DEFAULT_LOG_PATH: &str = "marcconv.log";

impl CliOptions {
    /// Parse a full invocation, `args[0]` (the program name) included
    /// and discarded.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ArgError> {
        let all: Vec<String> = args.into_iter().collect();
        let rest = if all.is_empty() { &all[..] } else { &all[1..] };
        let (options, positionals) = split_args(rest)?;

        let mut append = false;
        let mut max_errors = DEFAULT_MAX_ERRORS;
        let mut log_path = DEFAULT_LOG_PATH.to_string();
        let mut max_records = None;
        let mut ctl_search_path = None;
        let mut skip_records = 0u64;

        for opt in options {
            match opt.letter {
                'a' => append = true,
                'e' => max_errors = parse_numeric(&opt)?,
                'l' => log_path = opt.value.unwrap_or_else(|| DEFAULT_LOG_PATH.to_string()),
                'n' => max_records = Some(parse_numeric(&opt)?),
                'p' => ctl_search_path = opt.value,
                's' => skip_records = parse_numeric(&opt)?,
                other => return Err(ArgError::UnrecognizedOption(other)),
            }
        }

        if positionals.len() < 2 {
            return Err(ArgError::InsufficientArguments);
        }
        let mut it = positionals.into_iter();
        let infile = it.next().unwrap();
        let outfile = it.next().unwrap();
        let ctlfile = it.next();
        let switchfile = it.next();

        Ok(CliOptions {
            infile,
            outfile,
            ctlfile,
            switchfile,
            append,
            max_errors,
            log_path,
            max_records,
            ctl_search_path,
            skip_records,
        })
    }

    /// The usage banner printed for `-?`/`-h` or a parse failure.
    #[must_use]
    pub fn usage(prog: &str) -> String {
        format!(
            "usage: {prog} [-a] [-e<n>] [-l<path>] [-n<n>] [-p<path>] [-s<n>] infile outfile [ctlfile [switchfile]]"
        )
    }
}

fn parse_numeric<T>(opt: &ParsedOption) -> Result<T, ArgError>
where
    T: std::str::FromStr,
{
    opt.value
        .as_deref()
        .and_then(|v| v.parse().ok())
        .ok_or(ArgError::MissingArgument(opt.letter))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions, ArgError> {
        CliOptions::parse(args.iter().map(ToString::to_string))
    }

    #[test]
    fn minimal_invocation_uses_defaults() {
        let opts = parse(&["marcconv", "in.mrc", "out.mrc"]).unwrap();
        assert_eq!(opts.infile, "in.mrc");
        assert_eq!(opts.outfile, "out.mrc");
        assert!(opts.ctlfile.is_none());
        assert!(!opts.append);
        assert_eq!(opts.max_errors, DEFAULT_MAX_ERRORS);
        assert_eq!(opts.log_path, DEFAULT_LOG_PATH);
        assert_eq!(opts.skip_records, 0);
    }

    #[test]
    fn all_positionals_and_attached_option_values() {
        let opts = parse(&["marcconv", "-a", "-e10", "-s5", "in.mrc", "out.mrc", "rules.ctl", "switch.txt"]).unwrap();
        assert!(opts.append);
        assert_eq!(opts.max_errors, 10);
        assert_eq!(opts.skip_records, 5);
        assert_eq!(opts.ctlfile.as_deref(), Some("rules.ctl"));
        assert_eq!(opts.switchfile.as_deref(), Some("switch.txt"));
    }

    #[test]
    fn option_value_as_separate_token() {
        let opts = parse(&["marcconv", "-l", "run.log", "-n", "100", "in.mrc", "out.mrc"]).unwrap();
        assert_eq!(opts.log_path, "run.log");
        assert_eq!(opts.max_records, Some(100));
    }

    #[test]
    fn unrecognized_option_errors() {
        assert_eq!(parse(&["marcconv", "-z", "in.mrc", "out.mrc"]), Err(ArgError::UnrecognizedOption('z')));
    }

    #[test]
    fn missing_required_value_errors() {
        assert_eq!(parse(&["marcconv", "-e", "in.mrc", "out.mrc"]), Err(ArgError::MissingArgument('e')));
    }

    #[test]
    fn too_few_positionals_errors() {
        assert_eq!(parse(&["marcconv", "in.mrc"]), Err(ArgError::InsufficientArguments));
    }

    #[test]
    fn usage_flag_is_not_an_ordinary_error() {
        assert_eq!(parse(&["marcconv", "-h"]), Err(ArgError::UsageRequested));
        assert_eq!(parse(&["marcconv", "-?"]), Err(ArgError::UsageRequested));
    }
}
