//! Recursive-descent parser producing the statement tree the interpreter
//! walks.
//!
//! Unsupported constructs (`def`, `class`, `try`, `lambda`, plain attribute
//! reads) are rejected here with a `SyntaxError` naming the construct, so the
//! model gets a precise observation instead of a confusing runtime failure.

use serde_json::Value;

use crate::{
    error::SandboxError,
    lexer::{tokenize, Tok, Token},
};

// ── Tree ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FPart {
    Literal(String),
    Hole {
        expr: Expr,
        conversion: Option<char>,
        spec: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    FString(Vec<FPart>),
    ListComp {
        element: Box<Expr>,
        target: Box<Target>,
        iter: Box<Expr>,
        conditions: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Subscript(Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, Option<Box<Expr>>, Option<Box<Expr>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Tuple(Vec<Target>),
    Subscript { container: String, index: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign(Target, Expr),
    AugAssign(Target, BinOp, Expr),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    /// `import a.b as c` or `from a.b import c`; `bindings` are the local names.
    Import { module: String, bindings: Vec<String> },
    Pass,
    Break,
    Continue,
}

// ── Entry points ─────────────────────────────────────────────────────────────

/// Parse a whole fragment. Common leading indentation is removed first.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, SandboxError> {
    let tokens = tokenize(&dedent(source))?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut program = Vec::new();
    loop {
        parser.skip_newlines();
        if parser.at(&Tok::Eof) {
            break;
        }
        program.extend(parser.statement()?);
    }
    Ok(program)
}

/// Parse a single expression (used for f-string holes).
pub fn parse_expression(source: &str) -> Result<Expr, SandboxError> {
    let tokens = tokenize(source.trim())?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr_list()?;
    parser.skip_newlines();
    if !parser.at(&Tok::Eof) {
        return Err(parser.error("unexpected trailing tokens in expression"));
    }
    Ok(expr)
}

fn dedent(source: &str) -> String {
    let margin = source
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    if margin == 0 {
        return source.to_string();
    }
    source
        .lines()
        .map(|l| if l.len() >= margin { &l[margin..] } else { l.trim_start() })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Parser ───────────────────────────────────────────────────────────────────

const UNSUPPORTED: &[&str] = &[
    "def", "class", "try", "except", "finally", "with", "lambda", "return", "yield", "raise",
    "global", "nonlocal", "del", "async", "await", "assert",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).map(|t| &t.tok).unwrap_or(&Tok::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens.get(self.pos + offset).map(|t| &t.tok).unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == word)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), SandboxError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", op)))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), SandboxError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", word)))
        }
    }

    fn expect_name(&mut self) -> Result<String, SandboxError> {
        match self.advance() {
            Tok::Name(name) => Ok(name),
            other => Err(self.error(format!("expected a name, found {:?}", other))),
        }
    }

    fn error(&self, message: impl Into<String>) -> SandboxError {
        SandboxError::Syntax { line: self.line(), message: message.into() }
    }

    fn skip_newlines(&mut self) {
        while self.at(&Tok::Newline) {
            self.pos += 1;
        }
    }

    // ── Statements ───────────────────────────────────────────────────────────

    fn statement(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        if let Tok::Name(word) = self.peek().clone() {
            if UNSUPPORTED.contains(&word.as_str()) {
                return Err(self.error(format!("'{}' statements are not supported", word)));
            }
            match word.as_str() {
                "if" => return Ok(vec![self.if_statement()?]),
                "for" => return Ok(vec![self.for_statement()?]),
                "while" => return Ok(vec![self.while_statement()?]),
                _ => {}
            }
        }
        if self.at(&Tok::Indent) {
            return Err(self.error("unexpected indent"));
        }
        self.simple_line()
    }

    /// One or more `;`-separated simple statements ending the logical line.
    fn simple_line(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        let mut stmts = vec![self.simple_statement()?];
        while self.eat_op(";") {
            if self.at(&Tok::Newline) || self.at(&Tok::Eof) {
                break;
            }
            stmts.push(self.simple_statement()?);
        }
        match self.peek().clone() {
            Tok::Newline => {
                self.pos += 1;
                Ok(stmts)
            }
            Tok::Eof | Tok::Dedent => Ok(stmts),
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }

    fn simple_statement(&mut self) -> Result<Stmt, SandboxError> {
        if self.eat_keyword("pass") {
            return Ok(Stmt::Pass);
        }
        if self.eat_keyword("break") {
            return Ok(Stmt::Break);
        }
        if self.eat_keyword("continue") {
            return Ok(Stmt::Continue);
        }
        if self.at_keyword("import") {
            return self.import_statement();
        }
        if self.at_keyword("from") {
            return self.from_import_statement();
        }

        let expr = self.expr_list()?;

        if self.eat_op("=") {
            let target = self.to_target(expr)?;
            let value = self.expr_list()?;
            return Ok(Stmt::Assign(target, value));
        }

        let augmented = match self.peek() {
            Tok::Op("+=") => Some(BinOp::Add),
            Tok::Op("-=") => Some(BinOp::Sub),
            Tok::Op("*=") => Some(BinOp::Mul),
            Tok::Op("/=") => Some(BinOp::Div),
            Tok::Op("//=") => Some(BinOp::FloorDiv),
            Tok::Op("%=") => Some(BinOp::Mod),
            Tok::Op("**=") => Some(BinOp::Pow),
            _ => None,
        };
        if let Some(op) = augmented {
            self.pos += 1;
            let target = self.to_target(expr)?;
            if matches!(target, Target::Tuple(_)) {
                return Err(self.error("illegal target for augmented assignment"));
            }
            let value = self.expr_list()?;
            return Ok(Stmt::AugAssign(target, op, value));
        }

        Ok(Stmt::Expr(expr))
    }

    fn to_target(&self, expr: Expr) -> Result<Target, SandboxError> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Tuple(items) | Expr::List(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|e| self.to_target(e))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Subscript(container, index) => match *container {
                Expr::Name(container) => Ok(Target::Subscript { container, index: *index }),
                _ => Err(self.error("only subscripts of plain variables can be assigned")),
            },
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn dotted_name(&mut self) -> Result<String, SandboxError> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn import_statement(&mut self) -> Result<Stmt, SandboxError> {
        self.expect_keyword("import")?;
        let module = self.dotted_name()?;
        let binding = if self.eat_keyword("as") {
            self.expect_name()?
        } else {
            module.split('.').next().unwrap_or(&module).to_string()
        };
        if self.at_op(",") {
            return Err(self.error("import one module per statement"));
        }
        Ok(Stmt::Import { module, bindings: vec![binding] })
    }

    fn from_import_statement(&mut self) -> Result<Stmt, SandboxError> {
        self.expect_keyword("from")?;
        let module = self.dotted_name()?;
        self.expect_keyword("import")?;
        let parenthesized = self.eat_op("(");
        let mut bindings = Vec::new();
        loop {
            if self.eat_op("*") {
                break;
            }
            let name = self.expect_name()?;
            let binding = if self.eat_keyword("as") { self.expect_name()? } else { name };
            bindings.push(binding);
            if !self.eat_op(",") {
                break;
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        Ok(Stmt::Import { module, bindings })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        self.expect_op(":")?;
        if !self.at(&Tok::Newline) {
            return self.simple_line();
        }
        self.skip_newlines();
        if !self.at(&Tok::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.pos += 1;
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if self.at(&Tok::Dedent) {
                self.pos += 1;
                break;
            }
            if self.at(&Tok::Eof) {
                break;
            }
            body.extend(self.statement()?);
        }
        Ok(body)
    }

    fn if_statement(&mut self) -> Result<Stmt, SandboxError> {
        self.expect_keyword("if")?;
        let mut branches = vec![(self.expr()?, self.block()?)];
        let mut otherwise = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat_keyword("elif") {
                branches.push((self.expr()?, self.block()?));
            } else if self.eat_keyword("else") {
                otherwise = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If { branches, otherwise })
    }

    fn for_statement(&mut self) -> Result<Stmt, SandboxError> {
        self.expect_keyword("for")?;
        let target = self.loop_target()?;
        self.expect_keyword("in")?;
        let iter = self.expr_list()?;
        let body = self.block()?;
        Ok(Stmt::For { target, iter, body })
    }

    fn while_statement(&mut self) -> Result<Stmt, SandboxError> {
        self.expect_keyword("while")?;
        let condition = self.expr()?;
        let body = self.block()?;
        Ok(Stmt::While { condition, body })
    }

    /// `x`, `x, y`, or `(x, y)` before `in`.
    fn loop_target(&mut self) -> Result<Target, SandboxError> {
        let mut items = Vec::new();
        loop {
            if self.eat_op("(") {
                let inner = self.loop_target()?;
                self.expect_op(")")?;
                items.push(inner);
            } else {
                items.push(Target::Name(self.expect_name()?));
            }
            if !self.eat_op(",") {
                break;
            }
        }
        if items.len() == 1 {
            Ok(items.remove(0))
        } else {
            Ok(Target::Tuple(items))
        }
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    fn ends_expression(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Newline | Tok::Eof | Tok::Dedent | Tok::Op("=") | Tok::Op(")") | Tok::Op("]")
                | Tok::Op("}") | Tok::Op(":") | Tok::Op(";")
        ) || matches!(self.peek(), Tok::Op(op) if op.ends_with('=') && *op != "==" && *op != "!=" && *op != "<=" && *op != ">=")
    }

    /// A comma-separated list; more than one element (or a trailing comma)
    /// makes a tuple.
    fn expr_list(&mut self) -> Result<Expr, SandboxError> {
        let first = self.expr()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.ends_expression() || self.at_keyword("in") {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn expr(&mut self) -> Result<Expr, SandboxError> {
        let value = self.or_expr()?;
        if self.eat_keyword("if") {
            let condition = self.or_expr()?;
            self.expect_keyword("else")?;
            let otherwise = self.expr()?;
            return Ok(Expr::IfElse {
                condition: Box::new(condition),
                then: Box::new(value),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(value)
    }

    fn or_expr(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, SandboxError> {
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SandboxError> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek().clone() {
                Tok::Op("==") => CmpOp::Eq,
                Tok::Op("!=") => CmpOp::NotEq,
                Tok::Op("<") => CmpOp::Lt,
                Tok::Op("<=") => CmpOp::LtE,
                Tok::Op(">") => CmpOp::Gt,
                Tok::Op(">=") => CmpOp::GtE,
                Tok::Name(n) if n == "in" => CmpOp::In,
                Tok::Name(n) if n == "not" && matches!(self.peek_at(1), Tok::Name(m) if m == "in") => {
                    self.pos += 1;
                    CmpOp::NotIn
                }
                Tok::Name(n) if n == "is" => {
                    if matches!(self.peek_at(1), Tok::Name(m) if m == "not") {
                        self.pos += 1;
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn arith(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("//") => BinOp::FloorDiv,
                Tok::Op("%") => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, SandboxError> {
        if self.eat_op("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.factor()?)));
        }
        if self.eat_op("+") {
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.factor()?)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, SandboxError> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exponent = self.factor()?;
            return Ok(Expr::Binary(Box::new(base), BinOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.atom()?;
        loop {
            if self.at_op("(") {
                let Expr::Name(function) = expr else {
                    return Err(self.error("only named functions can be called"));
                };
                self.pos += 1;
                let (args, kwargs) = self.call_arguments()?;
                expr = Expr::Call { function, args, kwargs };
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else if self.eat_op(".") {
                let method = self.expect_name()?;
                if !self.eat_op("(") {
                    return Err(self.error(format!("attribute access ('.{}') is not supported", method)));
                }
                let (args, kwargs) = self.call_arguments()?;
                if !kwargs.is_empty() {
                    return Err(self.error(format!("keyword arguments are not supported for '.{}()'", method)));
                }
                expr = Expr::MethodCall { receiver: Box::new(expr), method, args };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), SandboxError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.eat_op(")") {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Tok::Name(name), Tok::Op("=")) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.pos += 2;
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error(format!("keyword argument repeated: {}", name)));
                }
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                let arg = self.expr()?;
                if self.at_keyword("for") {
                    args.push(self.comprehension(arg)?);
                } else {
                    args.push(arg);
                }
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn subscript(&mut self, container: Expr) -> Result<Expr, SandboxError> {
        let lower = if self.at_op(":") { None } else { Some(self.expr()?) };
        if self.eat_op(":") {
            let upper = if self.at_op("]") { None } else { Some(Box::new(self.expr()?)) };
            self.expect_op("]")?;
            return Ok(Expr::Slice(Box::new(container), lower.map(Box::new), upper));
        }
        self.expect_op("]")?;
        let index = lower.ok_or_else(|| self.error("empty subscript"))?;
        Ok(Expr::Subscript(Box::new(container), Box::new(index)))
    }

    fn comprehension(&mut self, element: Expr) -> Result<Expr, SandboxError> {
        self.expect_keyword("for")?;
        let target = self.loop_target()?;
        self.expect_keyword("in")?;
        let iter = self.or_expr()?;
        let mut conditions = Vec::new();
        while self.eat_keyword("if") {
            conditions.push(self.or_expr()?);
        }
        if self.at_keyword("for") {
            return Err(self.error("nested comprehensions are not supported"));
        }
        Ok(Expr::ListComp {
            element: Box::new(element),
            target: Box::new(target),
            iter: Box::new(iter),
            conditions,
        })
    }

    fn atom(&mut self) -> Result<Expr, SandboxError> {
        match self.advance() {
            Tok::Int(i) => Ok(Expr::Const(Value::from(i))),
            Tok::Float(f) => Ok(Expr::Const(crate::value::float(f))),
            Tok::Str(s) => self.string_run(vec![FPart::Literal(s)], false),
            Tok::FStr(s) => {
                let parts = self.fstring_parts(&s)?;
                self.string_run(parts, true)
            }
            Tok::Name(name) => Ok(match name.as_str() {
                "None" => Expr::Const(Value::Null),
                "True" => Expr::Const(Value::Bool(true)),
                "False" => Expr::Const(Value::Bool(false)),
                word if UNSUPPORTED.contains(&word) => {
                    return Err(self.error(format!("'{}' is not supported", word)));
                }
                _ => Expr::Name(name.clone()),
            }),
            Tok::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expr()?;
                if self.at_keyword("for") {
                    let comp = self.comprehension(first)?;
                    self.expect_op(")")?;
                    return Ok(comp);
                }
                if self.eat_op(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op(")") {
                        break;
                    }
                    items.push(self.expr()?);
                }
                self.expect_op(")")?;
                Ok(Expr::Tuple(items))
            }
            Tok::Op("[") => {
                if self.eat_op("]") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expr()?;
                if self.at_keyword("for") {
                    let comp = self.comprehension(first)?;
                    self.expect_op("]")?;
                    return Ok(comp);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op("]") {
                        break;
                    }
                    items.push(self.expr()?);
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            Tok::Op("{") => {
                let mut entries = Vec::new();
                while !self.eat_op("}") {
                    let key = self.expr()?;
                    if !self.eat_op(":") {
                        return Err(self.error("set literals are not supported"));
                    }
                    let value = self.expr()?;
                    entries.push((key, value));
                    if !self.eat_op(",") {
                        self.expect_op("}")?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }

    /// Adjacent string literals concatenate; any f-string in the run makes
    /// the whole run formatted.
    fn string_run(&mut self, mut parts: Vec<FPart>, mut formatted: bool) -> Result<Expr, SandboxError> {
        loop {
            match self.peek().clone() {
                Tok::Str(s) => {
                    self.pos += 1;
                    parts.push(FPart::Literal(s));
                }
                Tok::FStr(s) => {
                    self.pos += 1;
                    parts.extend(self.fstring_parts(&s)?);
                    formatted = true;
                }
                _ => break,
            }
        }
        if !formatted {
            let text: String = parts
                .into_iter()
                .map(|p| match p {
                    FPart::Literal(s) => s,
                    FPart::Hole { .. } => String::new(),
                })
                .collect();
            return Ok(Expr::Const(Value::String(text)));
        }
        Ok(Expr::FString(parts))
    }

    fn fstring_parts(&self, body: &str) -> Result<Vec<FPart>, SandboxError> {
        let chars: Vec<char> = body.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '{' if chars.get(i + 1) == Some(&'{') => {
                    literal.push('{');
                    i += 2;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    literal.push('}');
                    i += 2;
                }
                '{' => {
                    if !literal.is_empty() {
                        parts.push(FPart::Literal(std::mem::take(&mut literal)));
                    }
                    let (hole, next) = self.fstring_hole(&chars, i + 1)?;
                    parts.push(hole);
                    i = next;
                }
                '}' => return Err(self.error("f-string: single '}' is not allowed")),
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            parts.push(FPart::Literal(literal));
        }
        Ok(parts)
    }

    /// Parse one `{expr!c:spec}` hole starting after the `{`. Returns the
    /// part and the index after the closing `}`.
    fn fstring_hole(&self, chars: &[char], start: usize) -> Result<(FPart, usize), SandboxError> {
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut expr_end = None;
        let mut i = start;
        while i < chars.len() {
            let c = chars[i];
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
            } else {
                match c {
                    '\'' | '"' => quote = Some(c),
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' => depth = depth.saturating_sub(1),
                    '}' if depth > 0 => depth -= 1,
                    '}' => break,
                    '!' if depth == 0 && chars.get(i + 1) != Some(&'=') && expr_end.is_none() => {
                        expr_end = Some(i)
                    }
                    ':' if depth == 0 && expr_end.is_none() => expr_end = Some(i),
                    ':' if depth == 0 => {}
                    _ => {}
                }
            }
            i += 1;
        }
        if i >= chars.len() {
            return Err(self.error("f-string: expecting '}'"));
        }

        let expr_end = expr_end.unwrap_or(i);
        let source: String = chars[start..expr_end].iter().collect();
        if source.trim().is_empty() {
            return Err(self.error("f-string: empty expression not allowed"));
        }
        let expr = parse_expression(&source).map_err(|e| match e {
            SandboxError::Syntax { message, .. } => self.error(format!("f-string: {}", message)),
            other => other,
        })?;

        let mut conversion = None;
        let mut spec = None;
        let mut cursor = expr_end;
        if chars.get(cursor) == Some(&'!') {
            conversion = chars.get(cursor + 1).copied();
            cursor += 2;
        }
        if chars.get(cursor) == Some(&':') {
            spec = Some(chars[cursor + 1..i].iter().collect());
        }
        Ok((FPart::Hole { expr, conversion, spec }, i + 1))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_assignment_and_call() {
        let program = parse_program("result = search_by_material('Copper')\nprint(result)").unwrap();
        assert_eq!(program.len(), 2);
        match &program[0] {
            Stmt::Assign(Target::Name(name), Expr::Call { function, args, .. }) => {
                assert_eq!(name, "result");
                assert_eq!(function, "search_by_material");
                assert_eq!(args, &vec![Expr::Const(json!("Copper"))]);
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn parses_keyword_arguments() {
        let program = parse_program("final_answer(answer='Wood')").unwrap();
        let Stmt::Expr(Expr::Call { kwargs, .. }) = &program[0] else {
            panic!("expected a call");
        };
        assert_eq!(kwargs[0].0, "answer");
    }

    #[test]
    fn parses_if_elif_else_blocks() {
        let source = "if x > 1:\n    y = 1\nelif x == 1:\n    y = 2\nelse:\n    y = 3\nprint(y)";
        let program = parse_program(source).unwrap();
        assert_eq!(program.len(), 2);
        let Stmt::If { branches, otherwise } = &program[0] else {
            panic!("expected an if statement");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn parses_for_loop_with_tuple_target() {
        let program = parse_program("for name, score in pairs:\n    print(name)").unwrap();
        let Stmt::For { target, .. } = &program[0] else {
            panic!("expected a for loop");
        };
        assert!(matches!(target, Target::Tuple(items) if items.len() == 2));
    }

    #[test]
    fn parses_fstring_holes_with_spec() {
        let expr = parse_expression("f'{name}: {value:.2f} {{raw}}'").unwrap();
        let Expr::FString(parts) = expr else {
            panic!("expected an f-string");
        };
        assert_eq!(parts.len(), 4);
        assert!(matches!(&parts[2], FPart::Hole { spec: Some(s), .. } if s == ".2f"));
        assert_eq!(parts[3], FPart::Literal(" {raw}".into()));
    }

    #[test]
    fn strips_common_indentation() {
        let program = parse_program("    x = 1\n    print(x)\n").unwrap();
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn rejects_function_definitions() {
        let err = parse_program("def f():\n    pass").unwrap_err();
        assert!(err.to_string().contains("'def' statements are not supported"));
    }

    #[test]
    fn rejects_plain_attribute_reads() {
        let err = parse_program("x = math.pi").unwrap_err();
        assert!(err.to_string().contains("attribute access"));
    }

    #[test]
    fn parses_list_comprehension() {
        let expr = parse_expression("[r['Material'] for r in rows if r]").unwrap();
        assert!(matches!(expr, Expr::ListComp { ref conditions, .. } if conditions.len() == 1));
    }

    #[test]
    fn comprehension_target_may_be_a_tuple() {
        let expr = parse_expression("[k for k, v in pairs]").unwrap();
        match expr {
            Expr::ListComp { target, .. } => assert_eq!(
                *target,
                Target::Tuple(vec![Target::Name("k".into()), Target::Name("v".into())])
            ),
            other => panic!("expected ListComp, got {:?}", other),
        }
    }
}
