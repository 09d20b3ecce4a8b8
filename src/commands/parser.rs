use crate::error::ValidationError;
use crate::models::GenderFilter;

/// Split on whitespace, keeping double-quoted runs together.
///
/// Straight and curly quotes are both accepted. Quotes only group; they
/// are not part of the token.
pub fn tokenize(content: &str) -> Result<Vec<String>, ValidationError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    for c in content.chars() {
        match c {
            '"' | '\u{201c}' | '\u{201d}' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(ValidationError::UnterminatedQuote);
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    Ok(tokens)
}

/// A parsed `biasgame` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiasCommand {
    Start {
        filter: GenderFilter,
        size: Option<usize>,
    },
    /// Raw text after `stats`
    Stats(String),
    /// Tokens after `suggest`
    Suggest(Vec<String>),
    /// Raw text after `suggestion-note`
    SuggestionNote(String),
    Current,
    Idols,
    RefreshImages,
}

impl BiasCommand {
    pub fn parse(content: &str) -> Result<Self, ValidationError> {
        let content = content.trim();
        let (word, rest) = match content.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (content, ""),
        };

        match word.to_lowercase().as_str() {
            "stats" => Ok(BiasCommand::Stats(rest.to_string())),
            "suggest" => Ok(BiasCommand::Suggest(tokenize(rest)?)),
            "suggestion-note" => Ok(BiasCommand::SuggestionNote(rest.to_string())),
            "current" if rest.is_empty() => Ok(BiasCommand::Current),
            "idols" if rest.is_empty() => Ok(BiasCommand::Idols),
            "refresh-images" if rest.is_empty() => Ok(BiasCommand::RefreshImages),
            _ => parse_start(content),
        }
    }
}

/// `[gender] [size]` in either order
fn parse_start(content: &str) -> Result<BiasCommand, ValidationError> {
    let mut filter = None;
    let mut size = None;

    for word in content.split_whitespace() {
        if word.chars().all(|c| c.is_ascii_digit()) {
            if size.is_some() {
                return Err(ValidationError::InvalidArguments);
            }
            let value = word
                .parse::<usize>()
                .map_err(|_| ValidationError::InvalidArguments)?;
            size = Some(value);
        } else {
            if filter.is_some() {
                return Err(ValidationError::InvalidArguments);
            }
            let value = GenderFilter::parse(word).ok_or_else(|| ValidationError::InvalidGender {
                value: word.to_string(),
            })?;
            filter = Some(value);
        }
    }

    Ok(BiasCommand::Start {
        filter: filter.unwrap_or(GenderFilter::Girl),
        size,
    })
}
