//! Recursive-descent parser for PB.
//!
//! Grammar outline (statements are newline-terminated; a `:` either opens
//! an indented block or is followed by inline `;`-separated simple
//! statements):
//!
//! ```text
//! Program    ::= { StatementLine } EOF
//! Suite      ::= ":" NEWLINE INDENT { StatementLine } DEDENT
//!              | ":" SimpleStmt { ";" SimpleStmt } NEWLINE
//! Expr       ::= OrExpr
//! OrExpr     ::= AndExpr { "or" AndExpr }
//! AndExpr    ::= Comparison { "and" Comparison }
//! Comparison ::= Additive [ CompOp Additive ]          (no chaining)
//! Additive   ::= Term { ("+" | "-") Term }
//! Term       ::= Unary { ("*" | "/" | "//" | "%") Unary }
//! Unary      ::= ("-" | "not") Unary | Postfix
//! Postfix    ::= Primary { "(" Args ")" | "." IDENT | "[" Expr "]" }
//! ```

pub mod ast;
mod error;

pub use error::{ParseError, ParseResult};

use crate::lexer::{Span, Token, TokenKind};
use ast::{
    BinOp, ClassDef, ExceptHandler, Expr, ExprKind, FStringPart, FieldDecl, FuncDef, IfBranch,
    Parameter, Program, Stmt, StmtKind, Type, UnaryOp,
};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    loop_depth: usize,
    fn_depth: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::EOF, Span::default()));
        }
        Self {
            tokens,
            pos: 0,
            loop_depth: 0,
            fn_depth: 0,
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut body = Vec::new();
        while !self.at_eof() {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            self.parse_statement_line(&mut body)?;
        }
        Ok(Program { body })
    }

    // ───────────────────────── statements ─────────────────────────

    /// Parse one source line into `out`: either a single compound
    /// statement, or one or more `;`-separated simple statements.
    fn parse_statement_line(&mut self, out: &mut Vec<Stmt>) -> ParseResult<()> {
        if self.is_compound_start() {
            out.push(self.parse_compound_statement()?);
            return Ok(());
        }
        loop {
            out.push(self.parse_simple_statement()?);
            if self.eat(&TokenKind::Semicolon) {
                if self.check(&TokenKind::Newline) || self.at_eof() {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect_statement_end()?;
        Ok(())
    }

    fn is_compound_start(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Def
                | TokenKind::Class
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Try
        )
    }

    fn parse_compound_statement(&mut self) -> ParseResult<Stmt> {
        let kind = self.current().kind.clone();
        match kind {
            TokenKind::Def => self.parse_function_def().map(|(func, span)| {
                Stmt::new(StmtKind::FuncDef(func), span)
            }),
            TokenKind::Class => self.parse_class_def(),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::Try => self.parse_try_stmt(),
            _ => Err(self.error_here("expected a statement")),
        }
    }

    fn parse_simple_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        let kind = self.current().kind.clone();
        match kind {
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Raise => self.parse_raise_stmt(),
            TokenKind::Assert => {
                self.advance();
                let condition = self.parse_expr()?;
                Ok(Stmt::new(StmtKind::Assert { condition }, span))
            }
            TokenKind::Break => {
                if self.loop_depth == 0 {
                    return Err(self.error_here("'break' outside loop"));
                }
                self.advance();
                Ok(Stmt::new(StmtKind::Break, span))
            }
            TokenKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(self.error_here("'continue' outside loop"));
                }
                self.advance();
                Ok(Stmt::new(StmtKind::Continue, span))
            }
            TokenKind::Pass => {
                self.advance();
                Ok(Stmt::new(StmtKind::Pass, span))
            }
            TokenKind::Global => self.parse_global_stmt(),
            TokenKind::Import => self.parse_import_stmt(),
            TokenKind::Identifier(_) if self.peek_is(&TokenKind::Colon) => self.parse_var_decl(),
            _ => self.parse_expr_line(),
        }
    }

    /// Expression line: plain expression statement, assignment, or
    /// augmented assignment.
    fn parse_expr_line(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        let expr = self.parse_expr()?;

        if self.eat(&TokenKind::Assign) {
            self.check_assign_target(&expr)?;
            let value = self.parse_expr()?;
            return Ok(Stmt::new(
                StmtKind::Assign {
                    target: expr,
                    value,
                },
                span,
            ));
        }

        let aug_op = match self.current().kind {
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            TokenKind::FloorDivEq => Some(BinOp::FloorDiv),
            TokenKind::PercentEq => Some(BinOp::Mod),
            _ => None,
        };
        if let Some(op) = aug_op {
            self.advance();
            self.check_assign_target(&expr)?;
            let value = self.parse_expr()?;
            return Ok(Stmt::new(
                StmtKind::AugAssign {
                    op,
                    target: expr,
                    value,
                },
                span,
            ));
        }

        Ok(Stmt::new(StmtKind::Expr(expr), span))
    }

    fn check_assign_target(&self, target: &Expr) -> ParseResult<()> {
        match target.kind {
            ExprKind::Name(_) | ExprKind::Attr { .. } | ExprKind::Index { .. } => Ok(()),
            ExprKind::Bool(_) | ExprKind::NoneLit => Err(ParseError::new(
                target.span,
                "cannot assign to keyword literal",
            )),
            _ => Err(ParseError::new(
                target.span,
                "invalid assignment target",
            )),
        }
    }

    fn parse_var_decl(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        let name = self.expect_identifier("variable name")?;
        self.expect(&TokenKind::Colon, "':'")?;
        let declared = self.parse_type()?;
        self.expect(&TokenKind::Assign, "'=' and an initializer")?;
        let init = self.parse_expr()?;
        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                declared,
                init,
            },
            span,
        ))
    }

    fn parse_return_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        if self.fn_depth == 0 {
            return Err(self.error_here("'return' outside function"));
        }
        self.advance();
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expr()?)
        };
        Ok(Stmt::new(StmtKind::Return { value }, span))
    }

    fn parse_raise_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        self.advance();
        if self.at_statement_end() {
            return Err(self.error_here("'raise' requires an exception expression"));
        }
        let exc = self.parse_expr()?;
        Ok(Stmt::new(StmtKind::Raise { exc }, span))
    }

    fn parse_global_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        if self.fn_depth == 0 {
            return Err(self.error_here("'global' only allowed inside a function"));
        }
        self.advance();
        let mut names = vec![self.expect_identifier("variable name")?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_identifier("variable name")?);
        }
        Ok(Stmt::new(StmtKind::Global { names }, span))
    }

    fn parse_import_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        self.advance();
        let mut path = vec![self.expect_identifier("module name")?];
        while self.eat(&TokenKind::Dot) {
            path.push(self.expect_identifier("module name")?);
        }
        let alias = if self.eat(&TokenKind::As) {
            Some(self.expect_identifier("import alias")?)
        } else {
            None
        };
        Ok(Stmt::new(StmtKind::Import { path, alias }, span))
    }

    fn parse_if_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        self.advance();
        let mut branches = Vec::new();

        let condition = self.parse_expr()?;
        let body = self.parse_suite()?;
        branches.push(IfBranch {
            condition: Some(condition),
            body,
        });

        while self.eat(&TokenKind::Elif) {
            let condition = self.parse_expr()?;
            let body = self.parse_suite()?;
            branches.push(IfBranch {
                condition: Some(condition),
                body,
            });
        }

        if self.eat(&TokenKind::Else) {
            let body = self.parse_suite()?;
            branches.push(IfBranch {
                condition: None,
                body,
            });
        }

        Ok(Stmt::new(StmtKind::If { branches }, span))
    }

    fn parse_while_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        self.advance();
        let condition = self.parse_expr()?;
        self.loop_depth += 1;
        let body = self.parse_suite();
        self.loop_depth -= 1;
        Ok(Stmt::new(
            StmtKind::While {
                condition,
                body: body?,
            },
            span,
        ))
    }

    fn parse_for_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        self.advance();
        let var = self.expect_identifier("loop variable")?;
        self.expect(&TokenKind::In, "'in'")?;
        let iter = self.parse_expr()?;
        self.loop_depth += 1;
        let body = self.parse_suite();
        self.loop_depth -= 1;
        Ok(Stmt::new(
            StmtKind::For {
                var,
                iter,
                body: body?,
            },
            span,
        ))
    }

    fn parse_try_stmt(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        self.advance();
        let body = self.parse_suite()?;

        let mut handlers = Vec::new();
        while self.check(&TokenKind::Except) {
            let handler_span = self.current().span;
            self.advance();
            let exc_type = self.expect_identifier("exception type")?;
            let alias = if self.eat(&TokenKind::As) {
                Some(self.expect_identifier("exception alias")?)
            } else {
                None
            };
            let handler_body = self.parse_suite()?;
            handlers.push(ExceptHandler {
                exc_type,
                alias,
                body: handler_body,
                span: handler_span,
            });
        }
        if handlers.is_empty() {
            return Err(self.error_here("'try' requires at least one 'except' clause"));
        }

        Ok(Stmt::new(StmtKind::Try { body, handlers }, span))
    }

    fn parse_function_def(&mut self) -> ParseResult<(FuncDef, Span)> {
        let span = self.current().span;
        self.advance();
        let name = self.expect_identifier("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;

        let mut params: Vec<Parameter> = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.parse_parameter()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;

        let mut seen_default = false;
        for (index, param) in params.iter().enumerate() {
            if params[..index].iter().any(|p| p.name == param.name) {
                return Err(ParseError::new(
                    param.span,
                    format!("duplicate parameter '{}' in function '{name}'", param.name),
                ));
            }
            if param.default.is_some() {
                seen_default = true;
            } else if seen_default {
                return Err(ParseError::new(
                    param.span,
                    format!(
                        "parameter '{}' without a default follows a defaulted parameter",
                        param.name
                    ),
                ));
            }
        }

        let return_type = if self.eat(&TokenKind::Arrow) {
            self.parse_type()?
        } else {
            Type::None
        };

        self.fn_depth += 1;
        let body = self.parse_suite();
        self.fn_depth -= 1;

        Ok((
            FuncDef {
                name,
                params,
                return_type,
                body: body?,
                span,
            },
            span,
        ))
    }

    fn parse_parameter(&mut self) -> ParseResult<Parameter> {
        let span = self.current().span;
        let name = self.expect_identifier("parameter name")?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let default = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Parameter {
            name,
            ty,
            default,
            span,
        })
    }

    fn parse_class_def(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span;
        self.advance();
        let name = self.expect_identifier("class name")?;

        let base = if self.eat(&TokenKind::LParen) {
            let base = self.expect_identifier("base class name")?;
            self.expect(&TokenKind::RParen, "')'")?;
            Some(base)
        } else {
            None
        };

        let body = self.parse_suite()?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        for stmt in body {
            match stmt.kind {
                StmtKind::VarDecl {
                    name,
                    declared,
                    init,
                } => fields.push(FieldDecl {
                    name,
                    declared,
                    init,
                    span: stmt.span,
                }),
                StmtKind::FuncDef(func) => methods.push(func),
                StmtKind::Pass => {}
                _ => {
                    return Err(ParseError::new(
                        stmt.span,
                        format!(
                            "only field declarations and methods are allowed in class '{name}'"
                        ),
                    ));
                }
            }
        }

        Ok(Stmt::new(
            StmtKind::ClassDef(ClassDef {
                name,
                base,
                fields,
                methods,
                span,
            }),
            span,
        ))
    }

    /// A suite is either an indented block or an inline list of simple
    /// statements. The lexer never emits INDENT for an empty block, so an
    /// empty body (with or without comments) fails here.
    fn parse_suite(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::Colon, "':'")?;
        let mut body = Vec::new();

        if self.eat(&TokenKind::Newline) {
            while self.eat(&TokenKind::Newline) {}
            if !self.eat(&TokenKind::Indent) {
                return Err(self.error_here("expected an indented block"));
            }
            loop {
                if self.eat(&TokenKind::Dedent) {
                    break;
                }
                if self.eat(&TokenKind::Newline) {
                    continue;
                }
                if self.at_eof() {
                    return Err(self.error_here("unterminated block"));
                }
                self.parse_statement_line(&mut body)?;
            }
            return Ok(body);
        }

        // Inline suite: simple statements separated by ';' on the header line.
        loop {
            body.push(self.parse_simple_statement()?);
            if self.eat(&TokenKind::Semicolon) {
                if self.check(&TokenKind::Newline) || self.at_eof() {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect_statement_end()?;
        Ok(body)
    }

    // ───────────────────────── expressions ─────────────────────────

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and_expr()?;
        while self.check(&TokenKind::Or) {
            self.advance();
            let right = self.parse_and_expr()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.check(&TokenKind::And) {
            self.advance();
            let right = self.parse_comparison()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    /// One optional comparison; a second comparison operator in a row is
    /// rejected rather than chained.
    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let left = self.parse_additive()?;
        let Some(op) = self.comparison_op() else {
            return Ok(left);
        };
        let right = self.parse_additive()?;
        if self.comparison_op_ahead() {
            return Err(self.error_here("chained comparisons are not supported"));
        }
        Ok(binary(op, left, right))
    }

    fn comparison_op(&mut self) -> Option<BinOp> {
        let op = match self.current().kind {
            TokenKind::Eq => BinOp::Eq,
            TokenKind::NotEq => BinOp::NotEq,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Lte => BinOp::Lte,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Gte => BinOp::Gte,
            TokenKind::Is => BinOp::Is,
            _ => return None,
        };
        self.advance();
        if op == BinOp::Is && self.eat(&TokenKind::Not) {
            return Some(BinOp::IsNot);
        }
        Some(op)
    }

    fn comparison_op_ahead(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Eq
                | TokenKind::NotEq
                | TokenKind::Lt
                | TokenKind::Lte
                | TokenKind::Gt
                | TokenKind::Gte
                | TokenKind::Is
        )
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::FloorDiv => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let span = self.current().span;
        let op = match self.current().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Not => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// Postfix operators attach left to right, so `obj.method()[i](x)`
    /// nests as Call(Index(Call(Attr(obj, "method"), []), i), [x]).
    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RParen, "')'")?;
                let span = expr.span;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    span,
                );
            } else if self.eat(&TokenKind::Dot) {
                let name = self.expect_identifier("attribute name")?;
                let span = expr.span;
                expr = Expr::new(
                    ExprKind::Attr {
                        base: Box::new(expr),
                        name,
                    },
                    span,
                );
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                let span = expr.span;
                expr = Expr::new(
                    ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let span = self.current().span;
        let kind = match self.current().kind.clone() {
            TokenKind::Int(value) => {
                self.advance();
                ExprKind::Int(value)
            }
            TokenKind::Float(value) => {
                self.advance();
                ExprKind::Float(value)
            }
            TokenKind::Str(value) => {
                self.advance();
                ExprKind::Str(value)
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::None => {
                self.advance();
                ExprKind::NoneLit
            }
            TokenKind::Identifier(name) => {
                self.advance();
                ExprKind::Name(name)
            }
            TokenKind::FStringStart => return self.parse_fstring(),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                return Ok(expr);
            }
            TokenKind::LBracket => return self.parse_list_literal(),
            TokenKind::LBrace => return self.parse_dict_literal(),
            other => {
                return Err(ParseError::new(
                    span,
                    format!("expected an expression, got {other:?}"),
                ));
            }
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_fstring(&mut self) -> ParseResult<Expr> {
        let span = self.current().span;
        self.advance(); // FStringStart
        let mut parts = Vec::new();
        loop {
            match self.current().kind.clone() {
                TokenKind::FStringMiddle(text) => {
                    self.advance();
                    parts.push(FStringPart::Text(text));
                }
                TokenKind::LBrace => {
                    self.advance();
                    let expr = self.parse_expr()?;
                    self.expect(&TokenKind::RBrace, "'}'")?;
                    parts.push(FStringPart::Expr(expr));
                }
                TokenKind::FStringEnd => {
                    self.advance();
                    break;
                }
                other => {
                    return Err(self.error_at(
                        self.current().span,
                        format!("unexpected {other:?} inside f-string"),
                    ));
                }
            }
        }
        Ok(Expr::new(ExprKind::FString(parts), span))
    }

    fn parse_list_literal(&mut self) -> ParseResult<Expr> {
        let span = self.current().span;
        self.advance(); // '['
        let mut elems = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                elems.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Expr::new(ExprKind::List(elems), span))
    }

    fn parse_dict_literal(&mut self) -> ParseResult<Expr> {
        let span = self.current().span;
        self.advance(); // '{'
        let mut pairs = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = self.parse_expr()?;
                self.expect(&TokenKind::Colon, "':' in dict literal")?;
                let value = self.parse_expr()?;
                pairs.push((key, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                if self.check(&TokenKind::RBrace) {
                    break; // trailing comma
                }
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Expr::new(ExprKind::Dict(pairs), span))
    }

    /// Type annotations: `int`, `float`, `bool`, `str`, `None`,
    /// `list[T]`, `dict[str, T]`, or a class name.
    fn parse_type(&mut self) -> ParseResult<Type> {
        let span = self.current().span;
        if self.eat(&TokenKind::None) {
            return Ok(Type::None);
        }
        let name = self.expect_identifier("type name")?;
        let ty = match name.as_str() {
            "int" => Type::Int,
            "float" => Type::Float,
            "bool" => Type::Bool,
            "str" => Type::Str,
            "list" => {
                self.expect(&TokenKind::LBracket, "'[' after 'list'")?;
                let elem = self.parse_type()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                return Ok(Type::List(Box::new(elem)));
            }
            "dict" => {
                self.expect(&TokenKind::LBracket, "'[' after 'dict'")?;
                let key = self.parse_type()?;
                if key != Type::Str {
                    return Err(self.error_at(span, "dict keys must be 'str'"));
                }
                self.expect(&TokenKind::Comma, "','")?;
                let value = self.parse_type()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                return Ok(Type::Dict(Box::new(key), Box::new(value)));
            }
            _ => Type::Class(name),
        };
        Ok(ty)
    }

    // ───────────────────────── low-level helpers ─────────────────────────

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current().kind == *kind
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        self.tokens
            .get(self.pos + 1)
            .is_some_and(|token| token.kind == *kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::EOF)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::EOF
        )
    }

    fn expect_statement_end(&mut self) -> ParseResult<()> {
        if self.eat(&TokenKind::Newline) || self.at_eof() {
            Ok(())
        } else {
            Err(self.error_here("expected end of statement"))
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected {what}, got {:?}", self.current().kind)))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> ParseResult<String> {
        if let TokenKind::Identifier(name) = &self.current().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error_here(format!("expected {what}, got {:?}", self.current().kind)))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.current().span, message)
    }

    fn error_at(&self, span: Span, message: impl Into<String>) -> ParseError {
        ParseError::new(span, message)
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span = left.span;
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

pub fn parse_tokens(tokens: Vec<Token>) -> ParseResult<Program> {
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use indoc::indoc;

    fn parse(source: &str) -> Program {
        let tokens = lexer::tokenize(source).expect("tokenize should succeed");
        parse_tokens(tokens).expect("parse should succeed")
    }

    fn parse_err(source: &str) -> ParseError {
        let tokens = lexer::tokenize(source).expect("tokenize should succeed");
        parse_tokens(tokens).expect_err("expected parse failure")
    }

    #[test]
    fn parses_function_with_params_and_body() {
        let program = parse(indoc! {"
            def add(a: int, b: int) -> int:
                return a + b
        "});
        assert_eq!(program.body.len(), 1);
        let StmtKind::FuncDef(func) = &program.body[0].kind else {
            panic!("expected function definition");
        };
        assert_eq!(func.name, "add");
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.params[0].ty, Some(Type::Int));
        assert_eq!(func.return_type, Type::Int);
        assert!(matches!(
            func.body[0].kind,
            StmtKind::Return { value: Some(_) }
        ));
    }

    #[test]
    fn postfix_operators_nest_left_to_right() {
        let program = parse("obj.method()[i](x)\n");
        let StmtKind::Expr(expr) = &program.body[0].kind else {
            panic!("expected expression statement");
        };
        // Call(Index(Call(Attr(obj, "method"), []), i), [x])
        let ExprKind::Call { callee, args } = &expr.kind else {
            panic!("outermost node should be a call");
        };
        assert_eq!(args.len(), 1);
        let ExprKind::Index { base, .. } = &callee.kind else {
            panic!("call target should be an index expression");
        };
        let ExprKind::Call { callee: inner, .. } = &base.kind else {
            panic!("index base should be a call");
        };
        assert!(matches!(inner.kind, ExprKind::Attr { .. }));
    }

    #[test]
    fn parses_inline_suites_with_semicolons() {
        let program = parse(indoc! {"
            class M(P):
                def __init__(self): P.__init__(self); self.mp = 5
        "});
        let StmtKind::ClassDef(class) = &program.body[0].kind else {
            panic!("expected class definition");
        };
        assert_eq!(class.base.as_deref(), Some("P"));
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].body.len(), 2);
    }

    #[test]
    fn parses_if_elif_else_branches() {
        let program = parse(indoc! {"
            if a == 1:
                pass
            elif a == 2:
                pass
            else:
                pass
        "});
        let StmtKind::If { branches } = &program.body[0].kind else {
            panic!("expected if statement");
        };
        assert_eq!(branches.len(), 3);
        assert!(branches[2].condition.is_none());
    }

    #[test]
    fn parses_try_except_with_alias() {
        let program = parse(indoc! {"
            def main():
                try:
                    raise RuntimeError(\"zero\")
                except RuntimeError as e:
                    print(e)
        "});
        let StmtKind::FuncDef(func) = &program.body[0].kind else {
            panic!("expected function definition");
        };
        let StmtKind::Try { handlers, .. } = &func.body[0].kind else {
            panic!("expected try statement");
        };
        assert_eq!(handlers[0].exc_type, "RuntimeError");
        assert_eq!(handlers[0].alias.as_deref(), Some("e"));
    }

    #[test]
    fn parses_generic_type_annotations() {
        let program = parse("scores: dict[str, list[int]] = {}\n");
        let StmtKind::VarDecl { declared, .. } = &program.body[0].kind else {
            panic!("expected variable declaration");
        };
        assert_eq!(
            *declared,
            Type::Dict(
                Box::new(Type::Str),
                Box::new(Type::List(Box::new(Type::Int)))
            )
        );
    }

    #[test]
    fn rejects_break_outside_loop() {
        let err = parse_err("break\n");
        assert!(err.to_string().contains("'break' outside loop"));
    }

    #[test]
    fn accepts_break_inside_while() {
        let program = parse(indoc! {"
            while True:
                break
        "});
        assert!(matches!(program.body[0].kind, StmtKind::While { .. }));
    }

    #[test]
    fn rejects_return_outside_function() {
        let err = parse_err("return 1\n");
        assert!(err.to_string().contains("'return' outside function"));
    }

    #[test]
    fn rejects_empty_function_body() {
        let err = parse_err("def f():\n");
        assert!(err.to_string().contains("expected an indented block"));
    }

    #[test]
    fn rejects_duplicate_parameters() {
        let err = parse_err(indoc! {"
            def f(a: int, a: int):
                pass
        "});
        assert!(err.to_string().contains("duplicate parameter 'a'"));
    }

    #[test]
    fn rejects_default_before_required_parameter() {
        let err = parse_err(indoc! {"
            def f(a: int = 1, b: int):
                pass
        "});
        assert!(err.to_string().contains("defaulted parameter"));
    }

    #[test]
    fn rejects_assignment_to_keyword_literal() {
        let err = parse_err("True = 1\n");
        assert!(err.to_string().contains("cannot assign to keyword literal"));
    }

    #[test]
    fn rejects_chained_comparison() {
        let err = parse_err("x: bool = 1 < a < 10\n");
        assert!(err.to_string().contains("chained comparisons"));
    }

    #[test]
    fn rejects_dict_with_non_str_keys_in_annotation() {
        let err = parse_err("d: dict[int, str] = {}\n");
        assert!(err.to_string().contains("dict keys must be 'str'"));
    }

    #[test]
    fn rejects_statements_in_class_body() {
        let err = parse_err(indoc! {"
            class A:
                while True:
                    pass
        "});
        assert!(err.to_string().contains("allowed in class"));
    }

    #[test]
    fn is_not_parses_as_single_operator() {
        let program = parse("x: bool = a is not b\n");
        let StmtKind::VarDecl { init, .. } = &program.body[0].kind else {
            panic!("expected variable declaration");
        };
        assert!(matches!(
            init.kind,
            ExprKind::Binary {
                op: BinOp::IsNot,
                ..
            }
        ));
    }
}
