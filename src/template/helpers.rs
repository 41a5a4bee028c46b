use chrono::Utc;
use rand::{seq::SliceRandom, Rng};
use thiserror::Error;
use uuid::Uuid;

/// Upper bound for `random_chars` output.
const MAX_RANDOM_CHARS: usize = 1024 * 1024;

const ALPHANUMERIC: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const ADJECTIVES: &[&str] = &[
    "quick", "blue", "slow", "bright", "dark", "hot", "cold", "big", "small", "new", "old", "good",
    "bad",
];

const NOUNS: &[&str] = &[
    "car", "house", "cat", "dog", "book", "tree", "computer", "phone", "river", "sun", "moon",
];

const MUSIC_GENRES: &[&str] = &[
    "Rock",
    "Pop",
    "Jazz",
    "Classical",
    "Hip Hop",
    "Electronic",
    "Samba",
    "Bossa Nova",
    "Funk",
    "Reggae",
    "Metal",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HelperError {
    #[error("unknown helper pm.{0}")]
    Unknown(String),
    #[error("malformed helper call: {0}")]
    Malformed(String),
    #[error("pm.{name}: invalid argument {value:?} ({reason})")]
    InvalidArgument {
        name: String,
        value: String,
        reason: String,
    },
}

/// The restricted call surface available as `{{pm.name(args)}}`.
pub trait Helpers {
    /// # Errors
    /// Fails for unknown helpers or arguments the helper cannot use.
    fn call(&self, name: &str, args: &[String]) -> Result<String, HelperError>;
}

/// Randomness, timestamps and UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PmHelpers;

impl Helpers for PmHelpers {
    fn call(&self, name: &str, args: &[String]) -> Result<String, HelperError> {
        let mut rng = rand::thread_rng();
        match name {
            "timestamp" => Ok(Utc::now().timestamp().to_string()),
            "timestamp_ms" => Ok(Utc::now().timestamp_millis().to_string()),
            "iso_timestamp" => Ok(Utc::now().to_rfc3339()),
            "random_int" => {
                let min = int_arg(name, args, 0, 0)?;
                let max = int_arg(name, args, 1, 1000)?;
                if min > max {
                    return Err(HelperError::InvalidArgument {
                        name: name.to_string(),
                        value: format!("{min}..{max}"),
                        reason: "min is greater than max".to_string(),
                    });
                }
                Ok(rng.gen_range(min..=max).to_string())
            }
            "random_choice" => Ok(args.choose(&mut rng).cloned().unwrap_or_default()),
            "random_chars" => {
                let length = int_arg(name, args, 0, 10)?;
                let length = usize::try_from(length).map_err(|_| HelperError::InvalidArgument {
                    name: name.to_string(),
                    value: length.to_string(),
                    reason: "length must not be negative".to_string(),
                })?;
                if length > MAX_RANDOM_CHARS {
                    return Err(HelperError::InvalidArgument {
                        name: name.to_string(),
                        value: length.to_string(),
                        reason: format!("length must be at most {MAX_RANDOM_CHARS}"),
                    });
                }
                let charset: Vec<char> = args
                    .get(1)
                    .map(String::as_str)
                    .unwrap_or(ALPHANUMERIC)
                    .chars()
                    .collect();
                if charset.is_empty() {
                    return Ok(String::new());
                }
                Ok((0..length)
                    .filter_map(|_| charset.choose(&mut rng))
                    .collect())
            }
            "random_adjective" => Ok(pick(ADJECTIVES, &mut rng)),
            "random_noun" => Ok(pick(NOUNS, &mut rng)),
            "random_music_genre" => Ok(pick(MUSIC_GENRES, &mut rng)),
            "random_uuid" => Ok(Uuid::new_v4().to_string()),
            other => Err(HelperError::Unknown(other.to_string())),
        }
    }
}

fn pick(words: &[&str], rng: &mut impl Rng) -> String {
    words.choose(rng).copied().unwrap_or_default().to_string()
}

fn int_arg(name: &str, args: &[String], index: usize, default: i64) -> Result<i64, HelperError> {
    match args.get(index) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|err| HelperError::InvalidArgument {
                name: name.to_string(),
                value: raw.clone(),
                reason: err.to_string(),
            }),
    }
}

/// Splits `pm.name(arg, "quoted, arg")` into the helper name and its
/// literal arguments.
pub fn parse_call(expr: &str) -> Result<(String, Vec<String>), HelperError> {
    let malformed = || HelperError::Malformed(expr.to_string());
    let rest = expr.trim().strip_prefix("pm.").ok_or_else(malformed)?;
    let open = rest.find('(').ok_or_else(malformed)?;
    let inner = rest
        .get(open + 1..)
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(malformed)?;
    let name = rest[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(malformed());
    }
    Ok((name.to_string(), split_args(inner).ok_or_else(malformed)?))
}

fn split_args(inner: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    if inner.trim().is_empty() {
        return Some(args);
    }

    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut was_quoted = false;
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) if ch == '\\' => current.push(chars.next()?),
            Some(_) => current.push(ch),
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    was_quoted = true;
                }
                ',' => {
                    args.push(finish_arg(&current, was_quoted));
                    current.clear();
                    was_quoted = false;
                }
                _ => current.push(ch),
            },
        }
    }

    if quote.is_some() {
        return None;
    }
    args.push(finish_arg(&current, was_quoted));
    Some(args)
}

fn finish_arg(raw: &str, quoted: bool) -> String {
    if quoted {
        raw.to_string()
    } else {
        raw.trim().to_string()
    }
}
