/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Field(String),
}

/// A path template such as `$albumartist/$album/$track $title`.
///
/// `$name` and `${name}` reference fields, `$$` is a literal dollar sign and
/// a `$` not followed by a name is kept as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    tokens: Vec<Token>,
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some((_, '$')) => {
                    chars.next();
                    literal.push('$');
                }
                Some((start, '{')) => {
                    let rest = &source[start + 1..];
                    match rest.find('}') {
                        Some(end) if !rest[..end].is_empty() && rest[..end].chars().all(is_name_char) => {
                            flush(&mut tokens, &mut literal);
                            tokens.push(Token::Field(rest[..end].to_string()));
                            // Skip `{`, the name and `}`.
                            for _ in 0..end + 2 {
                                chars.next();
                            }
                        }
                        _ => literal.push('$'),
                    }
                }
                Some((start, c)) if is_name_start(c) => {
                    let len = source[start..]
                        .find(|c: char| !is_name_char(c))
                        .unwrap_or(source.len() - start);
                    flush(&mut tokens, &mut literal);
                    tokens.push(Token::Field(source[start..start + len].to_string()));
                    for _ in 0..len {
                        chars.next();
                    }
                }
                _ => literal.push('$'),
            }
        }
        flush(&mut tokens, &mut literal);
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Names of the referenced fields, in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Field(name) => Some(name.as_str()),
            Token::Literal(_) => None,
        })
    }
}

fn flush(tokens: &mut Vec<Token>, literal: &mut String) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}
