//! Query shapes: statement text with literal values abstracted away.

use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::trace;

/// Token substituted for every numeric or quoted literal.
pub const PLACEHOLDER: char = '?';

/// Replaces numeric and quoted literals with [`PLACEHOLDER`] and collapses
/// whitespace and comments to a single space.
///
/// A minus sign directly before a number is folded into the placeholder
/// unless it follows an operand (`id = -1` and `id = 2` share a shape,
/// `qty -1` keeps its subtraction). Trailing semicolons are dropped. When the
/// statement cannot be tokenized, e.g. an unterminated quote, it is returned
/// whitespace-normalized but otherwise untouched.
pub fn normalize(text: &str) -> String {
    let dialect = GenericDialect {};
    match Tokenizer::new(&dialect, text).tokenize() {
        Ok(tokens) => shape_from_tokens(&tokens),
        Err(err) => {
            trace!(%err, statement = text, "tokenizer rejected statement, keeping statement text");
            collapse_whitespace(text)
        }
    }
}

fn shape_from_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut pending_space = false;
    let mut after_operand = false;

    let mut tokens = tokens.iter().peekable();
    while let Some(token) = tokens.next() {
        if matches!(token, Token::Whitespace(_)) {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;

        let signed_number = matches!(token, Token::Minus)
            && !after_operand
            && matches!(tokens.peek(), Some(Token::Number(..)));
        if signed_number {
            tokens.next();
        }

        if signed_number || is_literal(token) {
            out.push(PLACEHOLDER);
            after_operand = true;
        } else {
            out.push_str(&token.to_string());
            after_operand = is_operand(token);
        }
    }

    out.trim_end_matches(|ch: char| ch == ';' || ch == ' ')
        .to_string()
}

fn is_literal(token: &Token) -> bool {
    match token {
        Token::Number(..)
        | Token::SingleQuotedString(_)
        | Token::DoubleQuotedString(_)
        | Token::NationalStringLiteral(_)
        | Token::EscapedStringLiteral(_)
        | Token::HexStringLiteral(_) => true,
        // GenericDialect reads "x" as an identifier; shapes treat it as a string.
        Token::Word(word) => word.quote_style == Some('"'),
        _ => false,
    }
}

fn is_operand(token: &Token) -> bool {
    match token {
        Token::Placeholder(_) | Token::RParen | Token::RBracket => true,
        Token::Word(word) => word.quote_style.is_some() || word.keyword == Keyword::NoKeyword,
        _ => false,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
