//! Recursive-descent parser producing the sandbox AST.
//!
//! The accepted language is straight-line: assignments, expression
//! statements and imports. Block statements are rejected with a
//! `SyntaxError` naming the keyword.

use super::lexer::{tokenize, SpannedToken, Token};
use super::value::{ScriptError, ScriptErrorKind, ScriptValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Field { expr: Expr, spec: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ScriptValue),
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Unpack(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign {
        targets: Vec<Target>,
        value: Expr,
    },
    AugAssign {
        name: String,
        op: BinaryOp,
        value: Expr,
    },
    Import {
        module: String,
        alias: Option<String>,
    },
    /// `from module import a as b`; a `*` import carries the name `*`.
    FromImport {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
    Pass,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub stmt: Stmt,
    pub line: usize,
}

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "def", "for", "while", "class", "if", "elif", "else", "try", "except", "finally", "with",
    "return", "lambda", "global", "nonlocal", "del", "assert", "raise", "yield", "async", "await",
    "break", "continue", "match",
];

/// Parses a full snippet.
pub fn parse_program(source: &str) -> Result<Vec<Statement>, ScriptError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).program()
}

/// Parses a single expression, rejecting anything else.
pub fn parse_expression(source: &str) -> Result<Expr, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    parser.skip_newlines();
    let expr = parser.expr_list()?;
    parser.skip_newlines();
    if !parser.at(&Token::Eof) {
        return Err(parser.error("expected a single expression"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == keyword)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ScriptError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", op)))
        }
    }

    fn expect_name(&mut self) -> Result<String, ScriptError> {
        match self.advance() {
            Token::Name(name) => Ok(name),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("expected a name"))
            }
        }
    }

    fn error(&self, message: &str) -> ScriptError {
        let found = match self.peek() {
            Token::Eof => "end of input".to_string(),
            Token::Newline => "end of line".to_string(),
            Token::Op(op) => format!("'{}'", op),
            Token::Name(name) => format!("'{}'", name),
            Token::Int(i) => i.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Str(_) | Token::FStr(_) => "string".to_string(),
        };
        ScriptError::new(
            ScriptErrorKind::SyntaxError,
            format!("{} (found {})", message, found),
        )
        .at_line(self.line())
    }

    fn skip_newlines(&mut self) {
        while self.at(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn program(&mut self) -> Result<Vec<Statement>, ScriptError> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.at(&Token::Eof) {
                return Ok(statements);
            }
            let line = self.line();
            let stmts = self.statement()?;
            if !(self.at(&Token::Newline) || self.at(&Token::Eof)) {
                return Err(self.error("unexpected token"));
            }
            statements.extend(stmts.into_iter().map(|stmt| Statement { stmt, line }));
        }
    }

    /// One logical line; `import a, b` expands to several statements.
    fn statement(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        if let Token::Name(word) = self.peek() {
            if UNSUPPORTED_KEYWORDS.contains(&word.as_str()) {
                return Err(ScriptError::new(
                    ScriptErrorKind::SyntaxError,
                    format!("'{}' statements are not supported in the sandbox", word),
                )
                .at_line(self.line()));
            }
        }

        if self.eat_keyword("pass") {
            return Ok(vec![Stmt::Pass]);
        }
        if self.eat_keyword("import") {
            let mut imports = Vec::new();
            loop {
                let module = self.dotted_name()?;
                let alias = if self.eat_keyword("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                imports.push(Stmt::Import { module, alias });
                if !self.eat_op(",") {
                    return Ok(imports);
                }
            }
        }
        if self.eat_keyword("from") {
            let module = self.dotted_name()?;
            if !self.eat_keyword("import") {
                return Err(self.error("expected 'import'"));
            }
            if self.eat_op("*") {
                return Ok(vec![Stmt::FromImport {
                    module,
                    names: vec![("*".to_string(), None)],
                }]);
            }
            let parenthesized = self.eat_op("(");
            let mut names = Vec::new();
            loop {
                let name = self.expect_name()?;
                let alias = if self.eat_keyword("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                names.push((name, alias));
                if !self.eat_op(",") || (parenthesized && self.at_op(")")) {
                    break;
                }
            }
            if parenthesized {
                self.expect_op(")")?;
            }
            return Ok(vec![Stmt::FromImport { module, names }]);
        }

        let first = self.expr_list()?;

        if self.at_op("=") {
            let mut targets = vec![to_target(first, self.line())?];
            let mut value;
            loop {
                self.expect_op("=")?;
                value = self.expr_list()?;
                if !self.at_op("=") {
                    break;
                }
                targets.push(to_target(value, self.line())?);
            }
            return Ok(vec![Stmt::Assign { targets, value }]);
        }

        let aug = match self.peek() {
            Token::Op("+=") => Some(BinaryOp::Add),
            Token::Op("-=") => Some(BinaryOp::Sub),
            Token::Op("*=") => Some(BinaryOp::Mul),
            Token::Op("/=") => Some(BinaryOp::Div),
            Token::Op("//=") => Some(BinaryOp::FloorDiv),
            Token::Op("%=") => Some(BinaryOp::Mod),
            Token::Op("**=") => Some(BinaryOp::Pow),
            _ => None,
        };
        if let Some(op) = aug {
            let Expr::Name(name) = first else {
                return Err(self.error("augmented assignment needs a plain name"));
            };
            self.pos += 1;
            let value = self.expr_list()?;
            return Ok(vec![Stmt::AugAssign { name, op, value }]);
        }

        Ok(vec![Stmt::Expr(first)])
    }

    fn dotted_name(&mut self) -> Result<String, ScriptError> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    /// Expression optionally followed by commas, forming a tuple.
    fn expr_list(&mut self) -> Result<Expr, ScriptError> {
        let first = self.expr()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn at_expression_end(&self) -> bool {
        matches!(self.peek(), Token::Newline | Token::Eof)
            || self.at_op("=")
            || self.at_op(")")
            || self.at_op("]")
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        if self.at_keyword("lambda") {
            return Err(ScriptError::new(
                ScriptErrorKind::SyntaxError,
                "lambda expressions are not supported in the sandbox",
            )
            .at_line(self.line()));
        }
        let body = self.or_expr()?;
        if self.eat_keyword("if") {
            let test = self.or_expr()?;
            if !self.eat_keyword("else") {
                return Err(self.error("expected 'else' in conditional expression"));
            }
            let orelse = self.expr()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn or_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ScriptError> {
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Op("==") => CompareOp::Eq,
                Token::Op("!=") => CompareOp::NotEq,
                Token::Op("<") => CompareOp::Lt,
                Token::Op("<=") => CompareOp::LtE,
                Token::Op(">") => CompareOp::Gt,
                Token::Op(">=") => CompareOp::GtE,
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn arith(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Op("+") => BinaryOp::Add,
                Token::Op("-") => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = binary(op, left, right);
        }
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Token::Op("*") => BinaryOp::Mul,
                Token::Op("/") => BinaryOp::Div,
                Token::Op("//") => BinaryOp::FloorDiv,
                Token::Op("%") => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.factor()?;
            left = binary(op, left, right);
        }
    }

    fn factor(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Token::Op("-") => Some(UnaryOp::Neg),
            Token::Op("+") => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.factor()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exponent = self.factor()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op("(") {
                let (args, kwargs) = self.call_arguments()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else if self.eat_op("[") {
                let index = self.expr()?;
                if self.at_op(":") {
                    return Err(self.error("slices are not supported"));
                }
                self.expect_op("]")?;
                expr = Expr::Index {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ScriptError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat_op(")") {
            if self.at_op("*") || self.at_op("**") {
                return Err(self.error("argument unpacking is not supported"));
            }
            let is_keyword = matches!(self.peek(), Token::Name(_))
                && matches!(self.peek_at(1), Token::Op("="));
            if is_keyword {
                let name = self.expect_name()?;
                self.pos += 1;
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(self.expr()?);
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> Result<Expr, ScriptError> {
        let line = self.line();
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(ScriptValue::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(ScriptValue::Float(f))),
            Token::Str(mut s) => {
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(ScriptValue::Str(s)))
            }
            Token::FStr(body) => Ok(Expr::FString(parse_fstring(&body, line)?)),
            Token::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Literal(ScriptValue::Bool(true))),
                "False" => Ok(Expr::Literal(ScriptValue::Bool(false))),
                "None" => Ok(Expr::Literal(ScriptValue::None)),
                _ => Ok(Expr::Name(name)),
            },
            Token::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let inner = self.expr_list()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Op("[") => {
                let mut items = Vec::new();
                while !self.eat_op("]") {
                    items.push(self.expr()?);
                    if !self.eat_op(",") {
                        self.expect_op("]")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Token::Op("{") => Err(ScriptError::new(
                ScriptErrorKind::SyntaxError,
                "dict and set literals are not supported in the sandbox",
            )
            .at_line(line)),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("expected an expression"))
            }
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn to_target(expr: Expr, line: usize) -> Result<Target, ScriptError> {
    let cannot_assign = || {
        ScriptError::new(ScriptErrorKind::SyntaxError, "cannot assign to expression").at_line(line)
    };
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Tuple(items) | Expr::List(items) => items
            .into_iter()
            .map(|item| match item {
                Expr::Name(name) => Ok(name),
                _ => Err(cannot_assign()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Target::Unpack),
        _ => Err(cannot_assign()),
    }
}

/// Splits an f-string body into literal text and `{expr[:spec]}` fields.
fn parse_fstring(body: &str, line: usize) -> Result<Vec<FStringPart>, ScriptError> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    let malformed = |msg: &str| {
        ScriptError::new(ScriptErrorKind::SyntaxError, format!("f-string: {}", msg)).at_line(line)
    };

    while i < chars.len() {
        let c = chars[i];
        if c == '{' && chars.get(i + 1) == Some(&'{') {
            text.push('{');
            i += 2;
            continue;
        }
        if c == '}' && chars.get(i + 1) == Some(&'}') {
            text.push('}');
            i += 2;
            continue;
        }
        if c == '}' {
            return Err(malformed("single '}' is not allowed"));
        }
        if c != '{' {
            text.push(c);
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut depth = 0;
        let mut quote: Option<char> = None;
        let mut split: Option<usize> = None;
        let mut end: Option<usize> = None;
        let mut j = start;
        while j < chars.len() {
            let ch = chars[j];
            match quote {
                Some(q) if ch == q => quote = None,
                Some(_) => {}
                None => match ch {
                    '\'' | '"' => quote = Some(ch),
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' => depth -= 1,
                    '}' if depth > 0 => depth -= 1,
                    '}' => {
                        end = Some(j);
                        break;
                    }
                    ':' if depth == 0 && split.is_none() => split = Some(j),
                    '!' if depth == 0
                        && split.is_none()
                        && chars.get(j + 1) != Some(&'=') =>
                    {
                        split = Some(j);
                    }
                    _ => {}
                },
            }
            j += 1;
        }
        let end = end.ok_or_else(|| malformed("expecting '}'"))?;

        let expr_end = split.unwrap_or(end);
        let expr_src: String = chars[start..expr_end].iter().collect();
        if expr_src.trim().is_empty() {
            return Err(malformed("empty expression not allowed"));
        }

        let spec = split.and_then(|s| {
            let raw: String = chars[s..end].iter().collect();
            // `!r` / `!s` conversions are accepted and ignored.
            let raw = match raw.strip_prefix('!') {
                Some(conv) => conv.get(1..).unwrap_or("").to_string(),
                None => raw,
            };
            let spec = raw.strip_prefix(':').unwrap_or(&raw).to_string();
            (!spec.is_empty()).then_some(spec)
        });

        let expr = parse_expression(&expr_src).map_err(|e| e.at_line(line))?;
        if !text.is_empty() {
            parts.push(FStringPart::Text(std::mem::take(&mut text)));
        }
        parts.push(FStringPart::Field { expr, spec });
        i = end + 1;
    }

    if !text.is_empty() {
        parts.push(FStringPart::Text(text));
    }
    Ok(parts)
}
