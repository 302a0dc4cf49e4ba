//! Lexing and parsing of `{{ ... }}` actions

use super::funcs::Func;
use super::value::Value;
use super::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Top-level template node
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
}

/// `[$var :=] command | command | ...`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub binding: Option<Binding>,
    pub commands: Vec<Command>,
}

/// Variable a pipeline's result is stored into
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Binding {
    pub name: String,
    pub declare: bool,
}

/// One stage of a pipeline: a function and its arguments, or a single operand
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Literal(Value),
    Dot,
    Field(Vec<String>),
    Variable(String),
    Function(Func),
    Pipeline(Box<Pipeline>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LeftParen,
    RightParen,
    Pipe,
    Declare,
    Assign,
    Str(String),
    Int(i64),
    Bool(bool),
    Dot,
    Field(Vec<String>),
    Variable(String),
    Ident(String),
}

/// Parse a whole template source into nodes
pub(crate) fn parse(source: &str) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();
    let mut variables = vec!["$".to_string()];
    let mut rest = source;
    let mut trim_next = false;

    loop {
        let Some(start) = rest.find(OPEN) else {
            push_text(&mut nodes, rest, trim_next, false);
            return Ok(nodes);
        };

        let mut inner = &rest[start + OPEN.len()..];
        let trim_left = inner.starts_with('-') && inner[1..].starts_with(is_space);
        if trim_left {
            inner = inner[1..].trim_start_matches(is_space);
        }
        push_text(&mut nodes, &rest[..start], trim_next, trim_left);

        if inner.starts_with("/*") {
            let (consumed, trim_right) = skip_comment(inner)?;
            rest = &inner[consumed..];
            trim_next = trim_right;
            continue;
        }

        let (tokens, consumed, trim_right) = lex_action(inner)?;
        rest = &inner[consumed..];
        trim_next = trim_right;

        let pipeline = parse_action(tokens, &mut variables)?;
        nodes.push(Node::Action(pipeline));
    }
}

fn is_space(c: char) -> bool {
    c.is_ascii_whitespace()
}

fn push_text(nodes: &mut Vec<Node>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start_matches(is_space);
    }
    if trim_end {
        text = text.trim_end_matches(is_space);
    }
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// Returns bytes consumed (including the closing delimiter) and the right-trim flag
fn skip_comment(inner: &str) -> Result<(usize, bool), TemplateError> {
    let end = inner
        .find("*/")
        .ok_or_else(|| TemplateError::Parse("unclosed comment".into()))?;
    let after = &inner[end + 2..];

    if after.starts_with(CLOSE) {
        return Ok((end + 2 + CLOSE.len(), false));
    }

    let trimmed = after.trim_start_matches(is_space);
    if trimmed.len() < after.len() && trimmed.starts_with("-}}") {
        let skipped = after.len() - trimmed.len();
        return Ok((end + 2 + skipped + 3, true));
    }

    Err(TemplateError::Parse(
        "comment ends before closing delimiter".into(),
    ))
}

// ============================================================================
// Lexer
// ============================================================================

/// Lex one action body, stopping at `}}` or ` -}}`
fn lex_action(src: &str) -> Result<(Vec<Token>, usize, bool), TemplateError> {
    let mut tokens = Vec::new();
    let mut i = 0;

    loop {
        let rest = &src[i..];
        let Some(c) = rest.chars().next() else {
            return Err(TemplateError::Parse("unclosed action".into()));
        };

        if is_space(c) {
            let trimmed = rest.trim_start_matches(is_space);
            if trimmed.starts_with("-}}") {
                let consumed = i + (rest.len() - trimmed.len()) + 3;
                return Ok((tokens, consumed, true));
            }
            i += rest.len() - trimmed.len();
            continue;
        }

        if rest.starts_with(CLOSE) {
            return Ok((tokens, i + CLOSE.len(), false));
        }

        match c {
            '(' => {
                tokens.push(Token::LeftParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RightParen);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            ':' if rest.starts_with(":=") => {
                tokens.push(Token::Declare);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            '"' => {
                let (s, len) = lex_quoted(rest)?;
                tokens.push(Token::Str(s));
                i += len;
            }
            '`' => {
                let end = rest[1..]
                    .find('`')
                    .ok_or_else(|| TemplateError::Parse("unterminated raw quoted string".into()))?;
                tokens.push(Token::Str(rest[1..1 + end].to_string()));
                i += end + 2;
            }
            '.' => {
                let (path, len) = lex_field_chain(rest);
                if path.is_empty() {
                    tokens.push(Token::Dot);
                    i += 1;
                } else {
                    tokens.push(Token::Field(path));
                    i += len;
                }
            }
            '$' => {
                let len = 1 + ident_len(&rest[1..]);
                tokens.push(Token::Variable(rest[..len].to_string()));
                i += len;
            }
            '-' | '+' | '0'..='9' => {
                let (n, len) = lex_number(rest)?;
                tokens.push(Token::Int(n));
                i += len;
            }
            c if c == '_' || c.is_alphabetic() => {
                let len = ident_len(rest);
                let word = &rest[..len];
                tokens.push(match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word.to_string()),
                });
                i += len;
            }
            other => {
                return Err(TemplateError::Parse(format!(
                    "unexpected {other:?} in command"
                )))
            }
        }
    }
}

fn ident_len(s: &str) -> usize {
    s.char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// `.A.B` → `["A", "B"]`; a lone `.` yields an empty path
fn lex_field_chain(s: &str) -> (Vec<String>, usize) {
    let mut path = Vec::new();
    let mut i = 0;

    while s[i..].starts_with('.') {
        let len = ident_len(&s[i + 1..]);
        if len == 0 {
            break;
        }
        path.push(s[i + 1..i + 1 + len].to_string());
        i += 1 + len;
    }

    (path, i)
}

fn lex_number(s: &str) -> Result<(i64, usize), TemplateError> {
    let sign_len = usize::from(s.starts_with(['-', '+']));
    let digits = s[sign_len..]
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len() - sign_len);
    let len = sign_len + digits;

    if digits == 0 {
        return Err(TemplateError::Parse(format!(
            "bad number syntax: {:?}",
            &s[..sign_len]
        )));
    }

    if s[len..].starts_with(|c: char| c.is_alphanumeric() || c == '.' || c == '_') {
        return Err(TemplateError::Parse(format!(
            "bad number syntax: {:?}",
            &s[..len]
        )));
    }

    s[..len]
        .parse()
        .map(|n| (n, len))
        .map_err(|e| TemplateError::Parse(format!("bad number {:?}: {e}", &s[..len])))
}

/// Lex a double-quoted string starting at `s[0] == '"'`
fn lex_quoted(s: &str) -> Result<(String, usize), TemplateError> {
    let mut out = String::new();
    let mut chars = s.char_indices().skip(1);

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((out, i + 1)),
            '\n' => break,
            '\\' => {
                let (_, esc) = chars
                    .next()
                    .ok_or_else(|| TemplateError::Parse("unterminated quoted string".into()))?;
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'a' => out.push('\u{07}'),
                    'b' => out.push('\u{08}'),
                    'f' => out.push('\u{0c}'),
                    'v' => out.push('\u{0b}'),
                    '\\' | '"' | '\'' => out.push(esc),
                    'x' | 'u' | 'U' => {
                        let width = match esc {
                            'x' => 2,
                            'u' => 4,
                            _ => 8,
                        };
                        let hex: String = chars.by_ref().take(width).map(|(_, c)| c).collect();
                        let decoded = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == width)
                            .and_then(char::from_u32)
                            .ok_or_else(|| {
                                TemplateError::Parse(format!("invalid escape \\{esc}{hex}"))
                            })?;
                        out.push(decoded);
                    }
                    other => {
                        return Err(TemplateError::Parse(format!(
                            "unknown escape sequence \\{other}"
                        )))
                    }
                }
            }
            c => out.push(c),
        }
    }

    Err(TemplateError::Parse("unterminated quoted string".into()))
}

// ============================================================================
// Parser
// ============================================================================

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
}

fn parse_action(tokens: Vec<Token>, variables: &mut Vec<String>) -> Result<Pipeline, TemplateError> {
    if tokens.is_empty() {
        return Err(TemplateError::Parse("missing value for command".into()));
    }

    let binding = match (tokens.first(), tokens.get(1)) {
        (Some(Token::Variable(name)), Some(Token::Declare)) => Some(Binding {
            name: name.clone(),
            declare: true,
        }),
        (Some(Token::Variable(name)), Some(Token::Assign)) => {
            if !variables.contains(name) {
                return Err(TemplateError::UndefinedVariable(name.clone()));
            }
            Some(Binding {
                name: name.clone(),
                declare: false,
            })
        }
        _ => None,
    };

    let mut cursor = Cursor {
        pos: if binding.is_some() { 2 } else { 0 },
        tokens,
    };

    let mut pipeline = parse_pipeline(&mut cursor, variables)?;
    if let Some(token) = cursor.bump() {
        return Err(TemplateError::Parse(format!(
            "unexpected {token:?} in operand"
        )));
    }

    if let Some(binding) = &binding {
        if binding.declare && !variables.contains(&binding.name) {
            variables.push(binding.name.clone());
        }
    }
    pipeline.binding = binding;

    Ok(pipeline)
}

fn parse_pipeline(cursor: &mut Cursor, variables: &[String]) -> Result<Pipeline, TemplateError> {
    let mut commands = Vec::new();

    loop {
        let command = parse_command(cursor, variables)?;
        if command.operands.is_empty() {
            return Err(TemplateError::Parse("missing command in pipeline".into()));
        }
        commands.push(command);

        match cursor.peek() {
            Some(Token::Pipe) => {
                cursor.bump();
            }
            _ => break,
        }
    }

    Ok(Pipeline {
        binding: None,
        commands,
    })
}

fn parse_command(cursor: &mut Cursor, variables: &[String]) -> Result<Command, TemplateError> {
    let mut operands = Vec::new();

    while let Some(token) = cursor.peek() {
        if matches!(token, Token::Pipe | Token::RightParen) {
            break;
        }

        let operand = match cursor.bump() {
            Some(Token::LeftParen) => {
                let inner = parse_pipeline(cursor, variables)?;
                match cursor.bump() {
                    Some(Token::RightParen) => Operand::Pipeline(Box::new(inner)),
                    _ => return Err(TemplateError::Parse("unclosed left paren".into())),
                }
            }
            Some(Token::Str(s)) => Operand::Literal(Value::Str(s)),
            Some(Token::Int(n)) => Operand::Literal(Value::Int(n)),
            Some(Token::Bool(b)) => Operand::Literal(Value::Bool(b)),
            Some(Token::Dot) => Operand::Dot,
            Some(Token::Field(path)) => Operand::Field(path),
            Some(Token::Variable(name)) => {
                if !variables.contains(&name) {
                    return Err(TemplateError::UndefinedVariable(name));
                }
                Operand::Variable(name)
            }
            Some(Token::Ident(name)) => Operand::Function(
                Func::from_name(&name).ok_or(TemplateError::UndefinedFunction(name))?,
            ),
            Some(token) => {
                return Err(TemplateError::Parse(format!(
                    "unexpected {token:?} in command"
                )))
            }
            None => break,
        };
        operands.push(operand);
    }

    Ok(Command { operands })
}
