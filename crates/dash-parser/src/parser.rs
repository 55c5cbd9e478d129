//! Parser implementation: converts pest output to AST

use std::iter::Peekable;
use std::sync::Arc;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::error::{ParseError, ParseResult};

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct DashParser;

/// Parse a source unit, classifying it as a bare expression or a module
pub fn parse_chunk(source: &str) -> ParseResult<Chunk> {
    let Module {
        mut statements,
        span,
    } = parse_module(source)?;

    if statements.len() == 1 {
        match statements.pop() {
            Some(Stmt {
                kind: StmtKind::Expr(expr),
                ..
            }) => return Ok(Chunk::Expression(expr)),
            Some(other) => statements.push(other),
            None => {}
        }
    }

    Ok(Chunk::Module(Module { statements, span }))
}

/// Parse a Dash module from source text
pub fn parse_module(source: &str) -> ParseResult<Module> {
    let mut pairs = DashParser::parse(Rule::chunk, source)?;
    let pair = expect_next(&mut pairs, "chunk")?;
    build_module(pair)
}

/// Parse a single expression (requires full input consumption)
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    let mut pairs = DashParser::parse(Rule::standalone_expression, source)?;
    let pair = expect_next(&mut pairs, "expression")?;
    let inner = pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::expression)
        .ok_or_else(|| ParseError::Malformed("expected expression".to_string()))?;
    build_expression(inner)
}

// =============================================================================
// Helper functions
// =============================================================================

fn span_from_pair(pair: &Pair<Rule>) -> Span {
    let pest_span = pair.as_span();
    Span::new(pest_span.start(), pest_span.end())
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_fn
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_for
            | Rule::kw_in
            | Rule::kw_switch
            | Rule::kw_return
            | Rule::kw_throw
            | Rule::kw_export
            | Rule::kw_as
    )
}

/// Inner pairs of a rule with keyword tokens filtered out
fn significant<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn expect_next<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    what: &str,
) -> ParseResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ParseError::Malformed(format!("expected {}", what)))
}

/// Line and column of a pair's first character
fn line_col(pair: &Pair<Rule>) -> (usize, usize) {
    pair.as_span().start_pos().line_col()
}

fn unexpected(pair: &Pair<Rule>) -> ParseError {
    ParseError::Malformed(format!("{:?} `{}`", pair.as_rule(), pair.as_str()))
}

fn build_identifier(pair: Pair<Rule>) -> Identifier {
    Spanned::new(pair.as_str().to_string(), span_from_pair(&pair))
}

// =============================================================================
// Module and statement building
// =============================================================================

fn build_module(pair: Pair<Rule>) -> ParseResult<Module> {
    debug_assert_eq!(pair.as_rule(), Rule::chunk);
    let span = span_from_pair(&pair);

    let mut statements = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::EOI => {}
            _ => statements.push(build_statement(inner)?),
        }
    }

    Ok(Module { statements, span })
}

fn build_statement(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let span = span_from_pair(&pair);

    let kind = match pair.as_rule() {
        Rule::export_statement => {
            let item = expect_next(&mut significant(pair), "export item")?;
            let item = match item.as_rule() {
                Rule::function_declaration => ExportItem::Function(build_function_decl(item)?),
                Rule::declaration => ExportItem::Declaration(build_declaration(item)?),
                Rule::identifier => ExportItem::Name(build_identifier(item)),
                _ => return Err(unexpected(&item)),
            };
            StmtKind::Export(item)
        }
        Rule::function_declaration => StmtKind::Function(build_function_decl(pair)?),
        Rule::for_statement => StmtKind::For(build_for_loop(pair)?),
        Rule::return_statement => {
            let value = significant(pair).next().map(build_expression).transpose()?;
            StmtKind::Return(value)
        }
        Rule::throw_statement => {
            let value = expect_next(&mut significant(pair), "thrown value")?;
            StmtKind::Throw(build_expression(value)?)
        }
        Rule::declaration => StmtKind::Declaration(build_declaration(pair)?),
        Rule::assignment => {
            let mut inner = pair.into_inner();
            let target = build_identifier(expect_next(&mut inner, "assignment target")?);
            let value = build_expression(expect_next(&mut inner, "assigned value")?)?;
            StmtKind::Assignment { target, value }
        }
        Rule::expression_statement => {
            let expr = expect_next(&mut pair.into_inner(), "expression")?;
            StmtKind::Expr(build_expression(expr)?)
        }
        _ => return Err(unexpected(&pair)),
    };

    Ok(Stmt { kind, span })
}

fn build_declaration(pair: Pair<Rule>) -> ParseResult<Declaration> {
    debug_assert_eq!(pair.as_rule(), Rule::declaration);
    let span = span_from_pair(&pair);

    let mut annotations = Vec::new();
    let mut name = None;
    let mut ty = None;
    let mut value = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::annotation => {
                let target = expect_next(&mut inner.into_inner(), "annotation")?;
                annotations.push(build_postfix_expr(target)?);
            }
            Rule::identifier => name = Some(build_identifier(inner)),
            Rule::declared_type => {
                let type_ref = expect_next(&mut inner.into_inner(), "type")?;
                ty = Some(build_type_ref(type_ref)?);
            }
            Rule::expression => value = Some(build_expression(inner)?),
            _ => {}
        }
    }

    Ok(Declaration {
        annotations,
        name: name.ok_or_else(|| ParseError::Malformed("expected name".to_string()))?,
        ty,
        value: value
            .ok_or_else(|| ParseError::Malformed("expected initializer".to_string()))?,
        span,
    })
}

fn build_function_decl(pair: Pair<Rule>) -> ParseResult<FunctionDecl> {
    debug_assert_eq!(pair.as_rule(), Rule::function_declaration);
    let span = span_from_pair(&pair);

    let mut inner = significant(pair);
    let name = build_identifier(expect_next(&mut inner, "function name")?);
    let function = build_function_parts(inner, span)?;

    Ok(FunctionDecl {
        name,
        function: Arc::new(function),
        span,
    })
}

fn build_function_parts<'i>(
    pairs: impl Iterator<Item = Pair<'i, Rule>>,
    span: Span,
) -> ParseResult<FunctionLiteral> {
    let mut params = Vec::new();
    let mut return_type = None;
    let mut body = None;

    for inner in pairs {
        match inner.as_rule() {
            Rule::parameter_list => {
                for param in inner.into_inner() {
                    params.push(build_parameter(param)?);
                }
            }
            Rule::return_type => {
                let type_ref = expect_next(&mut inner.into_inner(), "return type")?;
                return_type = Some(build_type_ref(type_ref)?);
            }
            Rule::function_body => {
                let content = expect_next(&mut inner.into_inner(), "function body")?;
                body = Some(match content.as_rule() {
                    Rule::block => {
                        let span = span_from_pair(&content);
                        Expr::new(ExprKind::Block(build_block(content)?), span)
                    }
                    _ => build_expression(content)?,
                });
            }
            _ => return Err(unexpected(&inner)),
        }
    }

    Ok(FunctionLiteral {
        params,
        return_type,
        body: body
            .ok_or_else(|| ParseError::Malformed("expected function body".to_string()))?,
        span,
    })
}

fn build_parameter(pair: Pair<Rule>) -> ParseResult<Parameter> {
    debug_assert_eq!(pair.as_rule(), Rule::parameter);
    let span = span_from_pair(&pair);

    let mut inner = pair.into_inner();
    let name = build_identifier(expect_next(&mut inner, "parameter name")?);
    let mut ty = None;
    let mut default = None;

    for part in inner {
        match part.as_rule() {
            Rule::type_ref => ty = Some(build_type_ref(part)?),
            Rule::parameter_default => {
                let value = expect_next(&mut part.into_inner(), "default value")?;
                default = Some(build_expression(value)?);
            }
            _ => return Err(unexpected(&part)),
        }
    }

    Ok(Parameter {
        name,
        ty,
        default,
        span,
    })
}

fn build_for_loop(pair: Pair<Rule>) -> ParseResult<ForLoop> {
    let span = span_from_pair(&pair);

    let mut inner = significant(pair);
    let variable = build_identifier(expect_next(&mut inner, "loop variable")?);
    let iterable = build_expression(expect_next(&mut inner, "iterable")?)?;
    let body = build_block(expect_next(&mut inner, "loop body")?)?;

    Ok(ForLoop {
        variable,
        iterable: Box::new(iterable),
        body,
        span,
    })
}

fn build_block(pair: Pair<Rule>) -> ParseResult<Block> {
    debug_assert_eq!(pair.as_rule(), Rule::block);
    let span = span_from_pair(&pair);

    let mut statements = pair
        .into_inner()
        .map(build_statement)
        .collect::<ParseResult<Vec<_>>>()?;

    let tail = match statements.pop() {
        Some(Stmt {
            kind: StmtKind::Expr(expr),
            ..
        }) => Some(Box::new(expr)),
        Some(other) => {
            statements.push(other);
            None
        }
        None => None,
    };

    Ok(Block {
        statements,
        tail,
        span,
    })
}

/// `a.b.c` in type position, built as dereference chains
fn build_type_ref(pair: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(pair.as_rule(), Rule::type_ref);

    let mut inner = pair.into_inner();
    let first = build_identifier(expect_next(&mut inner, "type name")?);
    let mut expr = Expr::new(ExprKind::Identifier(first.node), first.span);
    for part in inner {
        let member = build_identifier(part);
        expr = member_access(expr, member);
    }
    Ok(expr)
}

fn member_access(base: Expr, member: Identifier) -> Expr {
    let span = base.span.merge(member.span);
    Expr::new(
        ExprKind::Binary {
            op: BinaryOp::Dereference,
            left: Box::new(base),
            right: Box::new(Expr::new(ExprKind::String(member.node), member.span)),
        },
        span,
    )
}

// =============================================================================
// Expression building
// =============================================================================

fn build_expression(pair: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(pair.as_rule(), Rule::expression);

    let mut inner = pair.into_inner();
    let first = build_prefix_expr(expect_next(&mut inner, "operand")?)?;

    let mut rest = Vec::new();
    while let Some(op_pair) = inner.next() {
        let op = parse_binary_op(&op_pair)?;
        let operand = build_prefix_expr(expect_next(&mut inner, "operand")?)?;
        rest.push((op, operand));
    }

    let mut rest = rest.into_iter().peekable();
    Ok(climb(first, &mut rest, 0))
}

/// Precedence climbing over the flat `operand (op operand)*` list
fn climb(
    mut left: Expr,
    rest: &mut Peekable<std::vec::IntoIter<(BinaryOp, Expr)>>,
    min_precedence: u8,
) -> Expr {
    while let Some(op) = rest.peek().map(|(op, _)| *op) {
        if op.precedence() < min_precedence {
            break;
        }
        let Some((_, mut right)) = rest.next() else {
            break;
        };

        while let Some(next) = rest.peek().map(|(op, _)| *op) {
            if next.precedence() > op.precedence() {
                right = climb(right, rest, op.precedence() + 1);
            } else if next.precedence() == op.precedence() && next.is_right_associative() {
                right = climb(right, rest, op.precedence());
            } else {
                break;
            }
        }

        let span = left.span.merge(right.span);
        left = Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        );
    }
    left
}

fn parse_binary_op(pair: &Pair<Rule>) -> ParseResult<BinaryOp> {
    let op = match pair.as_rule() {
        Rule::or_op => BinaryOp::Or,
        Rule::and_op => BinaryOp::And,
        Rule::eq_op => BinaryOp::Eq,
        Rule::ne_op => BinaryOp::Ne,
        Rule::le_op => BinaryOp::Le,
        Rule::ge_op => BinaryOp::Ge,
        Rule::lt_op => BinaryOp::Lt,
        Rule::gt_op => BinaryOp::Gt,
        Rule::concat_op => BinaryOp::Concat,
        Rule::add_op => BinaryOp::Add,
        Rule::sub_op => BinaryOp::Sub,
        Rule::pow_op => BinaryOp::Pow,
        Rule::mul_op => BinaryOp::Mul,
        Rule::div_op => BinaryOp::Div,
        Rule::mod_op => BinaryOp::Mod,
        _ => return Err(ParseError::Malformed(format!("operator `{}`", pair.as_str()))),
    };
    Ok(op)
}

fn build_prefix_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(pair.as_rule(), Rule::prefix_expr);

    let mut ops = Vec::new();
    let mut operand = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::prefix_op => {
                let op = match inner.as_str() {
                    "-" => UnaryOp::Negate,
                    "+" => UnaryOp::Plus,
                    "!" => UnaryOp::Not,
                    other => return Err(ParseError::Malformed(format!("operator `{}`", other))),
                };
                ops.push((op, span_from_pair(&inner)));
            }
            Rule::postfix_expr => operand = Some(build_postfix_expr(inner)?),
            _ => return Err(unexpected(&inner)),
        }
    }

    let mut expr =
        operand.ok_or_else(|| ParseError::Malformed("expected operand".to_string()))?;
    for (op, span) in ops.into_iter().rev() {
        let span = span.merge(expr.span);
        expr = Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(expr),
            },
            span,
        );
    }
    Ok(expr)
}

fn build_postfix_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(pair.as_rule(), Rule::postfix_expr);

    let mut inner = pair.into_inner();
    let mut expr = build_primary(expect_next(&mut inner, "primary expression")?)?;

    for suffix in inner {
        expr = apply_postfix_suffix(expr, suffix)?;
    }

    Ok(expr)
}

fn apply_postfix_suffix(base: Expr, suffix: Pair<Rule>) -> ParseResult<Expr> {
    debug_assert_eq!(suffix.as_rule(), Rule::postfix_suffix);
    let span = base.span.merge(span_from_pair(&suffix));

    let inner = expect_next(&mut suffix.into_inner(), "suffix")?;
    let kind = match inner.as_rule() {
        Rule::call_suffix => ExprKind::Call {
            callee: Box::new(base),
            args: inner
                .into_inner()
                .map(build_expression)
                .collect::<ParseResult<_>>()?,
        },
        Rule::member_suffix => {
            let member = build_identifier(expect_next(&mut inner.into_inner(), "member")?);
            return Ok(member_access(base, member));
        }
        Rule::index_suffix => {
            let index = build_expression(expect_next(&mut inner.into_inner(), "index")?)?;
            ExprKind::Binary {
                op: BinaryOp::Dereference,
                left: Box::new(base),
                right: Box::new(index),
            }
        }
        Rule::cast_suffix => {
            let type_ref = expect_next(&mut significant(inner), "cast type")?;
            ExprKind::Cast {
                value: Box::new(base),
                ty: Box::new(build_type_ref(type_ref)?),
            }
        }
        _ => return Err(unexpected(&inner)),
    };

    Ok(Expr::new(kind, span))
}

fn build_primary(pair: Pair<Rule>) -> ParseResult<Expr> {
    let span = span_from_pair(&pair);

    let kind = match pair.as_rule() {
        Rule::float => {
            let text = pair.as_str();
            ExprKind::Float(text.parse().map_err(|_| invalid_number(&pair))?)
        }
        Rule::integer => ExprKind::Int(parse_integer(pair)?),
        Rule::infinity => ExprKind::Float(f64::INFINITY),
        Rule::string => {
            let text = match pair.into_inner().next() {
                Some(raw) => unescape(raw.as_str(), line_col(&raw))?,
                None => String::new(),
            };
            ExprKind::String(text)
        }
        Rule::identifier => ExprKind::Identifier(pair.as_str().to_string()),
        Rule::parenthesized => {
            let inner = expect_next(&mut pair.into_inner(), "expression")?;
            return build_expression(inner);
        }
        Rule::array_literal => ExprKind::Array(
            pair.into_inner()
                .map(build_expression)
                .collect::<ParseResult<_>>()?,
        ),
        Rule::object_literal => {
            let mut fields = Vec::new();
            for field in pair.into_inner() {
                let mut parts = field.into_inner();
                let name = build_identifier(expect_next(&mut parts, "field name")?);
                let value = build_expression(expect_next(&mut parts, "field value")?)?;
                fields.push((name, value));
            }
            ExprKind::Object(fields)
        }
        Rule::function_literal => {
            ExprKind::Function(Arc::new(build_function_parts(significant(pair), span)?))
        }
        Rule::block => ExprKind::Block(build_block(pair)?),
        Rule::if_expr => build_if(pair)?,
        Rule::switch_expr => build_switch(pair)?,
        Rule::for_expr => ExprKind::For(Box::new(build_for_loop(pair)?)),
        _ => return Err(unexpected(&pair)),
    };

    Ok(Expr::new(kind, span))
}

fn build_if(pair: Pair<Rule>) -> ParseResult<ExprKind> {
    let mut inner = significant(pair);

    let condition = build_expression(expect_next(&mut inner, "condition")?)?;
    let then_pair = expect_next(&mut inner, "then branch")?;
    let then_span = span_from_pair(&then_pair);
    let then_branch = Expr::new(ExprKind::Block(build_block(then_pair)?), then_span);

    let else_branch = match inner.next() {
        Some(else_pair) => {
            let branch = expect_next(&mut significant(else_pair), "else branch")?;
            let branch = match branch.as_rule() {
                Rule::block => {
                    let span = span_from_pair(&branch);
                    Expr::new(ExprKind::Block(build_block(branch)?), span)
                }
                _ => build_expression(branch)?,
            };
            Some(Box::new(branch))
        }
        None => None,
    };

    Ok(ExprKind::If {
        condition: Box::new(condition),
        then_branch: Box::new(then_branch),
        else_branch,
    })
}

fn build_switch(pair: Pair<Rule>) -> ParseResult<ExprKind> {
    let mut subject = None;
    let mut cases = Vec::new();
    let mut default = None;

    for inner in significant(pair) {
        match inner.as_rule() {
            Rule::switch_subject => {
                let expr = expect_next(&mut inner.into_inner(), "switch subject")?;
                subject = Some(Box::new(build_expression(expr)?));
            }
            Rule::switch_arm => {
                let arm = expect_next(&mut inner.into_inner(), "switch arm")?;
                match arm.as_rule() {
                    Rule::case_arm => {
                        let mut parts = arm.into_inner();
                        let pattern = build_expression(expect_next(&mut parts, "pattern")?)?;
                        let result = build_expression(expect_next(&mut parts, "result")?)?;
                        cases.push(SwitchCase { pattern, result });
                    }
                    Rule::default_arm => {
                        let result = expect_next(&mut significant(arm), "default result")?;
                        default = Some(Box::new(build_expression(result)?));
                    }
                    _ => return Err(unexpected(&arm)),
                }
            }
            _ => return Err(unexpected(&inner)),
        }
    }

    Ok(ExprKind::Switch {
        subject,
        cases,
        default,
    })
}

// =============================================================================
// Literals
// =============================================================================

fn parse_integer(pair: Pair<Rule>) -> ParseResult<i64> {
    let digits = expect_next(&mut pair.into_inner(), "integer")?;
    let text = digits.as_str();
    let parsed = match digits.as_rule() {
        Rule::hex_int => i64::from_str_radix(&text[2..], 16),
        Rule::bin_int => i64::from_str_radix(&text[2..], 2),
        Rule::oct_int => i64::from_str_radix(&text[2..], 8),
        _ => text.parse(),
    };
    parsed.map_err(|_| invalid_number(&digits))
}

fn invalid_number(pair: &Pair<Rule>) -> ParseError {
    let (line, column) = line_col(pair);
    ParseError::InvalidNumber {
        text: pair.as_str().to_string(),
        line,
        column,
    }
}

/// Resolve escapes in string contents starting at `start` (line, column)
fn unescape(raw: &str, start: (usize, usize)) -> ParseResult<String> {
    let mut result = String::with_capacity(raw.len());
    let (mut line, mut column) = start;
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
            continue;
        }
        let escaped = match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('"') => '"',
            Some('\\') => '\\',
            other => {
                return Err(ParseError::InvalidEscape {
                    sequence: other.map_or_else(|| "\\".to_string(), |c| format!("\\{}", c)),
                    line,
                    column,
                })
            }
        };
        result.push(escaped);
        column += 2;
    }
    Ok(result)
}
