//! Reader: source text to nested-list code.
//!
//! Reading happens in five passes:
//! 1. [`preprocess`] rewrites a few textual shorthands and escapes
//! 2. [`tokenize`] scans the text into a flat [`Token`] stream
//! 3. [`check_brackets`] counts each bracket family independently
//! 4. [`expand_abbreviations`] turns `'x`, `` `x ``, `,x` and `,@x` into explicit forms
//! 5. [`nest`] builds the list tree
//!
//! All three bracket families are interchangeable once counted, so `[a b]`
//! reads the same as `(a b)`.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till, take_until, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, one_of},
    combinator::{all_consuming, map, opt, recognize, rest, value},
    sequence::{pair, preceded, terminated},
};

use crate::ast::{NumberType, Value, sym};
use crate::{Error, ParseError, ParseErrorKind};

/// Quote-like prefix characters and the forms they expand to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abbrev {
    Quote,
    Quasiquote,
    Unquote,
    UnquoteSplicing,
}

impl Abbrev {
    pub fn keyword(self) -> &'static str {
        match self {
            Abbrev::Quote => "quote",
            Abbrev::Quasiquote => "quasiquote",
            Abbrev::Unquote => "unquote",
            Abbrev::UnquoteSplicing => "unquote-splicing",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Open(char),
    Close(char),
    Abbrev(Abbrev),
    /// Contents of a string literal, escapes already resolved
    Str(String),
    /// Number, boolean or symbol
    Atom(Value),
}

const BLANK_CHARS: [char; 4] = [' ', '\t', '\r', '\n'];
const DELIMITERS: &str = "()[]{}'`,";

fn is_atom_boundary(c: char) -> bool {
    BLANK_CHARS.contains(&c) || DELIMITERS.contains(c) || c == '"' || c == ';'
}

/// Rewrite textual shorthands before scanning.
///
/// `λ` becomes `lambda`, a blank quoted group `'( )` becomes `'()`, an empty
/// `(string )` becomes `""`, `\n` and `\t` become the control characters and
/// `\"` becomes the doubled-quote escape.
pub fn preprocess(text: &str) -> String {
    let text = text.replace('λ', "lambda");
    let text = collapse_blank_group(&text, "'(", "'()");
    let text = collapse_blank_group(&text, "(string", "\"\"");
    text.replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"\"")
}

fn blank_group<'a>(input: &'a str, open: &str) -> IResult<&'a str, &'a str> {
    recognize((tag(open), multispace0, char(')'))).parse(input)
}

/// Replace every `open` + whitespace + `)` with `replacement`.
fn collapse_blank_group(text: &str, open: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut remaining = text;
    while let Some(pos) = remaining.find(open) {
        out.push_str(&remaining[..pos]);
        let candidate = &remaining[pos..];
        match blank_group(candidate, open) {
            Ok((after, _)) => {
                out.push_str(replacement);
                remaining = after;
            }
            Err(_) => {
                out.push_str(open);
                remaining = &candidate[open.len()..];
            }
        }
    }
    out.push_str(remaining);
    out
}

/// Parse a string literal; `""` inside the literal is an escaped quote
fn string_literal(input: &str) -> IResult<&str, Token> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => {
                let after = chars.as_str();
                if let Some(escaped) = after.strip_prefix('"') {
                    text.push('"');
                    remaining = escaped;
                    continue;
                }
                return Ok((after, Token::Str(text)));
            }
            Some(ch) => {
                text.push(ch);
                remaining = chars.as_str();
            }
            None => {
                // Point at the opening quote
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Char,
                )));
            }
        }
    }
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    preceded(char(';'), take_till(|c: char| c == '\n')).parse(input)
}

/// `#| ... |#`; an unterminated comment runs to the end of input
fn block_comment(input: &str) -> IResult<&str, &str> {
    preceded(
        tag("#|"),
        alt((terminated(take_until("|#"), tag("|#")), rest)),
    )
    .parse(input)
}

fn delimiter_token(c: char) -> Token {
    match c {
        '(' | '[' | '{' => Token::Open(c),
        ')' | ']' | '}' => Token::Close(c),
        '\'' => Token::Abbrev(Abbrev::Quote),
        '`' => Token::Abbrev(Abbrev::Quasiquote),
        _ => Token::Abbrev(Abbrev::Unquote),
    }
}

fn delimiter(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Abbrev(Abbrev::UnquoteSplicing), tag(",@")),
        map(one_of(DELIMITERS), delimiter_token),
    ))
    .parse(input)
}

/// Optional sign, digits, optional fraction
fn number_literal(input: &str) -> IResult<&str, &str> {
    recognize((opt(one_of("+-")), digit1, opt(pair(char('.'), digit1)))).parse(input)
}

/// Convert a bare lexeme to a number, boolean or symbol
fn atom_value(text: &str) -> Value {
    if let Ok((_, digits)) = all_consuming(number_literal).parse(text)
        && let Ok(n) = digits.parse::<NumberType>()
    {
        return Value::Number(n);
    }

    match text {
        "#t" | "#true" => Value::Bool(true),
        "#f" | "#false" => Value::Bool(false),
        _ => sym(text),
    }
}

fn atom(input: &str) -> IResult<&str, Token> {
    map(take_while1(|c: char| !is_atom_boundary(c)), |text: &str| {
        Token::Atom(atom_value(text))
    })
    .parse(input)
}

/// One lexeme; comments and whitespace produce no token
fn lexeme(input: &str) -> IResult<&str, Option<Token>> {
    alt((
        map(string_literal, Some),
        value(None, line_comment),
        value(None, block_comment),
        value(None, multispace1),
        map(delimiter, Some),
        map(atom, Some),
    ))
    .parse(input)
}

/// Scan preprocessed text into tokens.
pub fn tokenize(text: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        match lexeme(remaining) {
            Ok((after, token)) => {
                tokens.extend(token);
                remaining = after;
            }
            Err(nom::Err::Failure(e)) => {
                let offset = text.len() - e.input.len();
                return Err(ParseError::with_context(
                    ParseErrorKind::Incomplete,
                    "Unterminated string literal.",
                    text,
                    offset,
                )
                .into());
            }
            Err(_) => {
                let offset = text.len() - remaining.len();
                return Err(ParseError::with_context(
                    ParseErrorKind::InvalidSyntax,
                    "Unexpected input.",
                    text,
                    offset,
                )
                .into());
            }
        }
    }

    Ok(tokens)
}

/// Count each bracket family independently.
///
/// Curly braces are reported first, then square, then round.
pub fn check_brackets(tokens: &[Token]) -> Result<(), Error> {
    let (mut round, mut square, mut curly) = (0i64, 0i64, 0i64);
    for token in tokens {
        match token {
            Token::Open('(') => round += 1,
            Token::Open('[') => square += 1,
            Token::Open(_) => curly += 1,
            Token::Close(')') => round -= 1,
            Token::Close(']') => square -= 1,
            Token::Close(_) => curly -= 1,
            _ => {}
        }
    }

    for (count, family) in [(curly, "curly"), (square, "square"), (round, "round")] {
        if count != 0 {
            return Err(ParseError::new(
                ParseErrorKind::UnmatchedBrackets,
                format!("Unmatching {family} braces!"),
            )
            .into());
        }
    }
    Ok(())
}

/// Replace every abbreviation token with an explicit `( keyword datum )` group.
///
/// Abbreviations nest: `''x` expands to `(quote (quote x))`.
pub fn expand_abbreviations(tokens: &[Token]) -> Result<Vec<Token>, Error> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut pos = 0;
    while pos < tokens.len() {
        pos = match &tokens[pos] {
            Token::Abbrev(abbrev) => expand_abbreviation(tokens, pos, *abbrev, &mut out)?,
            token => {
                out.push(token.clone());
                pos + 1
            }
        };
    }
    Ok(out)
}

fn expand_abbreviation(
    tokens: &[Token],
    pos: usize,
    abbrev: Abbrev,
    out: &mut Vec<Token>,
) -> Result<usize, Error> {
    out.push(Token::Open('('));
    out.push(Token::Atom(sym(abbrev.keyword())));
    let next = copy_datum(tokens, pos + 1, abbrev, out)?;
    out.push(Token::Close(')'));
    Ok(next)
}

/// Copy one complete datum starting at `pos`, expanding abbreviations inside it.
/// Returns the position just past the datum.
fn copy_datum(
    tokens: &[Token],
    pos: usize,
    owner: Abbrev,
    out: &mut Vec<Token>,
) -> Result<usize, Error> {
    let missing = || {
        Error::from(ParseError::new(
            ParseErrorKind::InvalidSyntax,
            format!("Missing datum after '{}'.", owner.keyword()),
        ))
    };

    match tokens.get(pos) {
        None | Some(Token::Close(_)) => Err(missing()),
        Some(Token::Abbrev(inner)) => expand_abbreviation(tokens, pos, *inner, out),
        Some(Token::Open(ch)) => {
            out.push(Token::Open(*ch));
            let mut cursor = pos + 1;
            loop {
                match tokens.get(cursor) {
                    None => return Err(missing()),
                    Some(Token::Close(close)) => {
                        out.push(Token::Close(*close));
                        return Ok(cursor + 1);
                    }
                    Some(_) => cursor = copy_datum(tokens, cursor, owner, out)?,
                }
            }
        }
        Some(token) => {
            out.push(token.clone());
            Ok(pos + 1)
        }
    }
}

/// Build the list tree from an expanded token stream.
pub fn nest(tokens: Vec<Token>) -> Result<Vec<Value>, Error> {
    let mut current: Vec<Value> = Vec::new();
    let mut parents: Vec<Vec<Value>> = Vec::new();

    for token in tokens {
        match token {
            Token::Open(_) => parents.push(std::mem::take(&mut current)),
            Token::Close(close) => {
                let Some(parent) = parents.pop() else {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidSyntax,
                        format!("Unexpected closing bracket '{close}'."),
                    )
                    .into());
                };
                let list = std::mem::replace(&mut current, parent);
                current.push(Value::List(list));
            }
            Token::Str(text) => current.push(Value::String(text)),
            Token::Atom(atom) => current.push(atom),
            Token::Abbrev(abbrev) => {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidSyntax,
                    format!("Unexpanded '{}' abbreviation.", abbrev.keyword()),
                )
                .into());
            }
        }
    }

    if !parents.is_empty() {
        return Err(ParseError::new(ParseErrorKind::Incomplete, "Unclosed list.").into());
    }
    Ok(current)
}

/// Read a whole program into its top-level forms.
pub fn parse(text: &str) -> Result<Vec<Value>, Error> {
    let source = preprocess(text);
    let tokens = tokenize(&source)?;
    check_brackets(&tokens)?;
    let expanded = expand_abbreviations(&tokens)?;
    nest(expanded)
}
