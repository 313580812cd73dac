//! The recursive-descent parser.
//!
//! Precedence, lowest binding first: assignment (right associative),
//! combination definition, `||`, `&&`, `|`, `^`, `&`, equality, relational,
//! shifts, additive, multiplicative, `**`, prefix unaries, postfix forms
//! (member access, subtype access, boxes, `++`/`--`).
//!
//! Statement separators are `,`, `;` and newlines; `;` carries pause
//! semantics. Newlines are transparent right after an infix operator and
//! inside parentheses.

use crate::lexer::{tokenize, Tok, Token};
use crate::ParseError;
use boxc_ast::{
    BinOp, BoxNode, CompoundKind, Expr, ExprKind, Ident, Member, Sep, Span, Stmt, UnOp,
};

/// Parse a whole program: a statement list forming the implicit main box.
pub fn parse(source: &str) -> Result<BoxNode, ParseError> {
    let mut parser = Parser::new(source)?;
    let stmts = parser.stmt_list(&Tok::Eof)?;
    parser.expect(&Tok::Eof, "end of input")?;
    Ok(BoxNode {
        parent: None,
        stmts,
    })
}

/// Parse a single expression; used by tests.
pub fn parse_expr(source: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.expr()?;
    parser.skip_newlines();
    parser.expect(&Tok::Eof, "end of input")?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(source)?,
            idx: 0,
        })
    }

    fn peek(&self) -> &Tok {
        &self.tokens[self.idx].tok
    }

    fn peek_span(&self) -> Span {
        self.tokens[self.idx].span
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.idx].clone();
        if self.idx + 1 < self.tokens.len() {
            self.idx += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &'static str) -> Result<Token, ParseError> {
        if self.peek() == tok {
            Ok(self.bump())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        ParseError::UnexpectedToken {
            found: self.peek().describe(),
            expected,
            span: self.peek_span(),
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek() == &Tok::Newline {
            self.bump();
        }
    }

    // ----- statements -----------------------------------------------------

    /// Parse statements up to (not including) `terminator`.
    fn stmt_list(&mut self, terminator: &Tok) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        let mut sep = Sep::None;
        let mut sep_span = Span::NONE;
        self.skip_newlines();
        loop {
            if self.peek() == terminator || self.peek() == &Tok::Eof {
                // A trailing pause separator still counts as a statement so
                // that `X[...;]` invokes the parent's pause combination.
                if sep == Sep::Pause {
                    stmts.push(Stmt {
                        sep,
                        sep_span,
                        expr: None,
                    });
                }
                return Ok(stmts);
            }
            let expr = self.expr()?;
            // A bare type expression in statement position instantiates the
            // type; this is how `Else` and friends reach the box driver as
            // values instead of ignorable type tokens.
            let expr = if expr.is_type_expr() {
                let span = expr.span;
                Expr::new(ExprKind::Keyword(Box::new(expr)), span)
            } else {
                expr
            };
            stmts.push(Stmt {
                sep,
                sep_span,
                expr: Some(expr),
            });

            // Gather the separator run before the next statement; a `;`
            // anywhere in the run wins, carrying pause semantics.
            sep = Sep::None;
            sep_span = Span::NONE;
            let mut any = false;
            loop {
                match self.peek() {
                    Tok::Newline | Tok::Comma => {
                        let token = self.bump();
                        if sep != Sep::Pause {
                            sep = Sep::Plain;
                            sep_span = token.span;
                        }
                        any = true;
                    }
                    Tok::Semi => {
                        let token = self.bump();
                        sep = Sep::Pause;
                        sep_span = token.span;
                        any = true;
                    }
                    _ => break,
                }
            }
            if !any && self.peek() != terminator && self.peek() != &Tok::Eof {
                return Err(self.unexpected("`,`, `;`, or a new line"));
            }
        }
    }

    // ----- expressions ----------------------------------------------------

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.assign()
    }

    fn assign(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.comb_def()?;
        let op = match self.peek() {
            Tok::Assign => BinOp::Assign,
            Tok::PlusEq => BinOp::APlus,
            Tok::MinusEq => BinOp::AMinus,
            Tok::StarEq => BinOp::ATimes,
            Tok::SlashEq => BinOp::ADiv,
            Tok::PercentEq => BinOp::ARem,
            Tok::ShlEq => BinOp::AShl,
            Tok::ShrEq => BinOp::AShr,
            Tok::AmpEq => BinOp::ABAnd,
            Tok::CaretEq => BinOp::ABXor,
            Tok::PipeEq => BinOp::ABOr,
            _ => return Ok(lhs),
        };
        self.bump();
        self.skip_newlines();
        let rhs = self.assign()?;
        let span = lhs.span.merge(rhs.span);
        Ok(Expr::new(
            ExprKind::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn comb_def(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.binary(0)?;
        if self.peek() != &Tok::At {
            return Ok(lhs);
        }
        self.bump();
        self.skip_newlines();
        let parent = self.postfix(false)?;
        let mut span = lhs.span.merge(parent.span);

        let mut c_name = None;
        if self.eat(&Tok::Question) {
            if let Tok::Str(_) = self.peek() {
                let token = self.bump();
                if let Tok::Str(s) = token.tok {
                    span = span.merge(token.span);
                    c_name = Some((s, token.span));
                }
            }
        }

        let mut body = None;
        if self.peek() == &Tok::LBrack {
            self.bump();
            let stmts = self.stmt_list(&Tok::RBrack)?;
            let close = self.expect(&Tok::RBrack, "`]`")?;
            span = span.merge(close.span);
            body = Some(BoxNode {
                parent: None,
                stmts,
            });
        }

        Ok(Expr::new(
            ExprKind::CombDef {
                child: Box::new(lhs),
                parent: Box::new(parent),
                c_name,
                body,
            },
            span,
        ))
    }

    /// Binary operator levels, loosest first.
    const LEVELS: [&'static [(Tok, BinOp)]; 11] = [
        &[(Tok::PipePipe, BinOp::LOr)],
        &[(Tok::AmpAmp, BinOp::LAnd)],
        &[(Tok::Pipe, BinOp::BOr)],
        &[(Tok::Caret, BinOp::BXor)],
        &[(Tok::Amp, BinOp::BAnd)],
        &[(Tok::EqEq, BinOp::Eq), (Tok::NeOp, BinOp::Ne)],
        &[
            (Tok::Lt, BinOp::Lt),
            (Tok::Le, BinOp::Le),
            (Tok::Gt, BinOp::Gt),
            (Tok::Ge, BinOp::Ge),
        ],
        &[(Tok::Shl, BinOp::Shl), (Tok::Shr, BinOp::Shr)],
        &[(Tok::Plus, BinOp::Add), (Tok::Minus, BinOp::Sub)],
        &[
            (Tok::Star, BinOp::Mul),
            (Tok::Slash, BinOp::Div),
            (Tok::Percent, BinOp::Rem),
        ],
        &[(Tok::StarStar, BinOp::Pow)],
    ];

    fn binary(&mut self, level: usize) -> Result<Expr, ParseError> {
        if level >= Self::LEVELS.len() {
            return self.unary();
        }
        let mut lhs = self.binary(level + 1)?;
        loop {
            let op = Self::LEVELS[level]
                .iter()
                .find(|(tok, _)| tok == self.peek())
                .map(|(_, op)| *op);
            let Some(op) = op else { return Ok(lhs) };
            self.bump();
            self.skip_newlines();
            let rhs = self.binary(level + 1)?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(
                ExprKind::BinOp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Tok::Minus => Some(UnOp::Neg),
            Tok::Plus => Some(UnOp::Plus),
            Tok::Bang => Some(UnOp::Not),
            Tok::Tilde => Some(UnOp::BNot),
            Tok::PlusPlus => Some(UnOp::LInc),
            Tok::MinusMinus => Some(UnOp::LDec),
            Tok::Caret => Some(UnOp::Raise),
            Tok::Amp => Some(UnOp::Ref),
            Tok::Star => Some(UnOp::Deref),
            _ => None,
        };
        let Some(op) = op else {
            return self.postfix(true);
        };
        let token = self.bump();
        let operand = self.unary()?;
        let span = token.span.merge(operand.span);

        // Unary plus is the identity; fold it away here.
        if op == UnOp::Plus {
            return Ok(operand);
        }
        let kind = if operand.is_type_expr()
            && matches!(op, UnOp::Raise | UnOp::Ref | UnOp::Deref | UnOp::LInc)
        {
            ExprKind::UnTypeOp {
                op,
                operand: Box::new(operand),
            }
        } else {
            ExprKind::UnOp {
                op,
                operand: Box::new(operand),
            }
        };
        Ok(Expr::new(kind, span))
    }

    fn postfix(&mut self, allow_box: bool) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Tok::Dot => {
                    self.bump();
                    let token = self.bump();
                    let span = expr.span.merge(token.span);
                    expr = match token.tok {
                        Tok::LIdent(name) => Expr::new(
                            ExprKind::Get {
                                parent: Some(Box::new(expr)),
                                name: Ident::new(name, token.span),
                            },
                            span,
                        ),
                        Tok::UIdent(name) => Expr::new(
                            ExprKind::Subtype {
                                parent: Some(Box::new(expr)),
                                name: Ident::new(name, token.span),
                            },
                            span,
                        ),
                        _ => return Err(self.unexpected("member or subtype name after `.`")),
                    };
                }
                Tok::LBrack if allow_box => {
                    self.bump();
                    let stmts = self.stmt_list(&Tok::RBrack)?;
                    let close = self.expect(&Tok::RBrack, "`]`")?;
                    let span = expr.span.merge(close.span);
                    expr = Expr::new(
                        ExprKind::Box(BoxNode {
                            parent: Some(Box::new(expr)),
                            stmts,
                        }),
                        span,
                    );
                }
                Tok::PlusPlus => {
                    let token = self.bump();
                    let span = expr.span.merge(token.span);
                    expr = Expr::new(
                        ExprKind::UnOp {
                            op: UnOp::RInc,
                            operand: Box::new(expr),
                        },
                        span,
                    );
                }
                Tok::MinusMinus => {
                    let token = self.bump();
                    let span = expr.span.merge(token.span);
                    expr = Expr::new(
                        ExprKind::UnOp {
                            op: UnOp::RDec,
                            operand: Box::new(expr),
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.bump();
        let span = token.span;
        let expr = match token.tok {
            Tok::Int(i) => Expr::new(ExprKind::IntImm(i), span),
            Tok::Real(r) => Expr::new(ExprKind::RealImm(r), span),
            Tok::Char(c) => Expr::new(ExprKind::CharImm(c), span),
            Tok::Str(s) => Expr::new(ExprKind::StrImm(s), span),
            Tok::LIdent(name) => Expr::new(ExprKind::VarIdfr(name), span),
            Tok::UIdent(name) => Expr::new(ExprKind::TypeIdfr(name), span),
            Tok::Dollar(depth) => Expr::new(ExprKind::ArgGet { depth }, span),
            Tok::Dot => {
                let token = self.bump();
                let span = span.merge(token.span);
                match token.tok {
                    Tok::LIdent(name) => Expr::new(
                        ExprKind::Get {
                            parent: None,
                            name: Ident::new(name, token.span),
                        },
                        span,
                    ),
                    Tok::UIdent(name) => Expr::new(
                        ExprKind::Subtype {
                            parent: None,
                            name: Ident::new(name, token.span),
                        },
                        span,
                    ),
                    _ => return Err(self.unexpected("member or subtype name after `.`")),
                }
            }
            Tok::LBrack => {
                let stmts = self.stmt_list(&Tok::RBrack)?;
                let close = self.expect(&Tok::RBrack, "`]`")?;
                Expr::new(
                    ExprKind::Box(BoxNode {
                        parent: None,
                        stmts,
                    }),
                    span.merge(close.span),
                )
            }
            Tok::LParen => return self.compound(span),
            _ => {
                return Err(ParseError::UnexpectedToken {
                    found: token.tok.describe(),
                    expected: "an expression",
                    span,
                })
            }
        };
        Ok(expr)
    }

    // ----- compounds ------------------------------------------------------

    fn compound(&mut self, open: Span) -> Result<Expr, ParseError> {
        self.skip_newlines();
        if self.peek() == &Tok::RParen {
            let close = self.bump();
            return Err(ParseError::EmptyParens {
                span: open.merge(close.span),
            });
        }

        let mut members = Vec::new();
        let mut kind = CompoundKind::Identity;
        loop {
            let member = self.member()?;
            members.push(member);
            self.skip_newlines();
            match self.peek() {
                Tok::Comma => {
                    if kind == CompoundKind::Identity {
                        kind = CompoundKind::Struct;
                    }
                    self.bump();
                    self.skip_newlines();
                    // Allow a trailing comma before `)`.
                    if self.peek() == &Tok::RParen {
                        break;
                    }
                }
                Tok::Arrow => {
                    kind = CompoundKind::Species;
                    self.bump();
                    self.skip_newlines();
                }
                Tok::RParen => break,
                _ => return Err(self.unexpected("`,`, `=>`, or `)`")),
            }
        }
        let close = self.expect(&Tok::RParen, "`)`")?;
        let span = open.merge(close.span);

        // A single named member is still a structure: `(Int x)`.
        if kind == CompoundKind::Identity && members[0].name.is_some() {
            kind = CompoundKind::Struct;
        }

        // In a structure type, a bare lowercase identifier is a member name
        // inheriting the previous member's type: `(Real a, b)`.
        if kind == CompoundKind::Struct && members.iter().any(|m| m.name.is_some()) {
            for member in &mut members {
                if member.name.is_none() {
                    if let Some(Expr {
                        kind: ExprKind::VarIdfr(name),
                        span,
                    }) = member.expr.as_ref()
                    {
                        member.name = Some(Ident::new(name.clone(), *span));
                        member.expr = None;
                    }
                }
            }
        }

        Ok(Expr::new(ExprKind::Compound { kind, members }, span))
    }

    fn member(&mut self) -> Result<Member, ParseError> {
        let expr = self.expr()?;
        let mut span = expr.span;
        let mut name = None;
        if let Tok::LIdent(_) = self.peek() {
            let token = self.bump();
            if let Tok::LIdent(n) = token.tok {
                span = span.merge(token.span);
                name = Some(Ident::new(n, token.span));
            }
        }
        Ok(Member {
            name,
            expr: Some(expr),
            span,
        })
    }
}
