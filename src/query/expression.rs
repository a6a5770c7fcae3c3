//! The `$filter`/`$orderby` expression tree and its grammar.
//!
//! The builder consumes expressions through the compiler interface only; the
//! grammar here covers the comparison/boolean subset the built-in compiler
//! understands. Richer expression languages can be parsed elsewhere and fed
//! in as trees.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{alphanumeric1, char, digit1, multispace0, none_of},
    combinator::{map, opt, peek, recognize, value},
    error::ParseError,
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
    IResult, Parser,
};

use super::QueryOptionError;
use crate::utils::clean_for_logging;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// A filter/order expression.
///
/// `Property` holds a navigation path whose last element is a scalar
/// property name, e.g. `["Datastream", "name"]` for `Datastream/name`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Property(Vec<String>),
    Literal(Literal),
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

/// Parse a complete expression, rejecting trailing input.
pub fn parse_expression(input: &str) -> Result<Expression, QueryOptionError> {
    match ws(or_expr).parse(input) {
        Ok(("", expr)) => Ok(expr),
        Ok((rest, _)) => {
            log::debug!(
                "Trailing input in expression: {}",
                clean_for_logging(rest)
            );
            Err(QueryOptionError::Invalid {
                option: "$filter".to_string(),
                reason: "unexpected trailing input".to_string(),
            })
        }
        Err(e) => {
            log::debug!(
                "Failed to parse expression `{}`: {}",
                clean_for_logging(input),
                e
            );
            Err(QueryOptionError::Invalid {
                option: "$filter".to_string(),
                reason: "expression is not valid".to_string(),
            })
        }
    }
}

fn ws<'a, O, E: ParseError<&'a str>, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
{
    delimited(multispace0, inner, multispace0)
}

/// Succeeds when the input does not continue with an identifier character.
/// Keeps `or` from matching the start of a property named `orbit`.
fn word_boundary(input: &str) -> IResult<&str, ()> {
    match input.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => Err(nom::Err::Error(
            nom::error::Error::new(input, nom::error::ErrorKind::Satisfy),
        )),
        _ => Ok((input, ())),
    }
}

fn keyword<'a>(
    kw: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(tag_no_case(kw), peek(word_boundary))
}

fn or_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(keyword("or")), and_expr)).parse(input)?;
    Ok((input, rest.into_iter().fold(first, |acc, e| {
        Expression::Or(Box::new(acc), Box::new(e))
    })))
}

fn and_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = unary_expr(input)?;
    let (input, rest) = many0(preceded(ws(keyword("and")), unary_expr)).parse(input)?;
    Ok((input, rest.into_iter().fold(first, |acc, e| {
        Expression::And(Box::new(acc), Box::new(e))
    })))
}

fn unary_expr(input: &str) -> IResult<&str, Expression> {
    alt((
        map(preceded(ws(keyword("not")), unary_expr), |e| {
            Expression::Not(Box::new(e))
        }),
        comparison,
    ))
    .parse(input)
}

fn comparison(input: &str) -> IResult<&str, Expression> {
    let (input, left) = primary(input)?;
    let (input, tail) = opt(pair(ws(compare_op), primary)).parse(input)?;
    Ok((input, match tail {
        Some((op, right)) => Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        None => left,
    }))
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Eq, keyword("eq")),
        value(CompareOp::Ne, keyword("ne")),
        value(CompareOp::Ge, keyword("ge")),
        value(CompareOp::Gt, keyword("gt")),
        value(CompareOp::Le, keyword("le")),
        value(CompareOp::Lt, keyword("lt")),
    ))
    .parse(input)
}

fn primary(input: &str) -> IResult<&str, Expression> {
    alt((
        delimited(ws(char('(')), or_expr, ws(char(')'))),
        map(literal, Expression::Literal),
        map(property_path, Expression::Property),
    ))
    .parse(input)
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        value(Literal::Null, keyword("null")),
        value(Literal::Bool(true), keyword("true")),
        value(Literal::Bool(false), keyword("false")),
        map(quoted_string, Literal::Text),
        numeric_literal,
    ))
    .parse(input)
}

fn quoted_string(input: &str) -> IResult<&str, String> {
    delimited(
        char('\''),
        many0(alt((value('\'', tag("''")), none_of("'")))),
        char('\''),
    )
    .map(|chars: Vec<char>| chars.into_iter().collect())
    .parse(input)
}

fn numeric_literal(input: &str) -> IResult<&str, Literal> {
    let (rest, text) = recognize(pair(
        opt(char('-')),
        alt((recognize((digit1, char('.'), digit1)), digit1)),
    ))
    .parse(input)?;
    let lit = if text.contains('.') {
        Literal::Double(text.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
        })?)
    } else {
        Literal::Long(text.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?)
    };
    Ok((rest, lit))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(alphanumeric1, many0(pair(tag("_"), alphanumeric1)))).parse(input)
}

fn property_path(input: &str) -> IResult<&str, Vec<String>> {
    separated_list1(char('/'), identifier)
        .map(|parts: Vec<&str>| parts.iter().map(|p| p.to_string()).collect())
        .parse(input)
}
