// Formula parser - converts formula source into an expression tree
// Supports: numbers, cell refs (A1), ranges (A1:B5), aggregate calls
// (SUM/MIN/MAX/AVERAGE), basic math (+, -, *, /, %), parenthesized grouping.
//
// The scan is a single left-to-right pass over the token stream with
// explicit operator and operand stacks (shunting-yard); grouping, precedence,
// and function argument collection all happen on those stacks, so parse
// depth is independent of the call stack.

use rustc_hash::FxHashMap;
use std::fmt;

use crate::coord::Coord;

/// Aggregate functions understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    Sum,
    Min,
    Max,
    Average,
}

impl Func {
    pub fn name(self) -> &'static str {
        match self {
            Func::Sum => "SUM",
            Func::Min => "MIN",
            Func::Max => "MAX",
            Func::Average => "AVERAGE",
        }
    }

    /// Resolve a canonical (engine-level) function name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Func> {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Some(Func::Sum),
            "MIN" => Some(Func::Min),
            "MAX" => Some(Func::Max),
            "AVERAGE" => Some(Func::Average),
            _ => None,
        }
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse-time configuration: the argument separator and the localized
/// function spellings accepted in addition to the canonical names.
///
/// The separator defaults to `;` because `:` belongs to ranges and `,` to
/// the file format's content escaping. Structural characters (`( ) :`,
/// operators, digits) are not valid separators.
#[derive(Debug, Clone)]
pub struct FormulaOptions {
    pub arg_separator: char,
    aliases: FxHashMap<String, Func>,
}

impl Default for FormulaOptions {
    fn default() -> Self {
        let mut options = FormulaOptions {
            arg_separator: ';',
            aliases: FxHashMap::default(),
        };
        // Spellings the legacy .s2v files use.
        options.add_alias("SUMA", Func::Sum);
        options.add_alias("PROMEDIO", Func::Average);
        options
    }
}

impl FormulaOptions {
    /// Accept `name` as another spelling of `func`.
    pub fn add_alias(&mut self, name: &str, func: Func) {
        self.aliases.insert(name.to_ascii_uppercase(), func);
    }

    fn resolve(&self, name: &str) -> Option<Func> {
        Func::from_name(name).or_else(|| self.aliases.get(name).copied())
    }
}

/// Expression tree for one formula. Built once per edit, immutable after.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    CellRef(Coord),
    /// Rectangular block, bounds as written (normalized on expansion).
    Range(Coord, Coord),
    Function { func: Func, args: Vec<Expr> },
    BinaryOp { op: Op, left: Box<Expr>, right: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Op {
    /// `* / %` bind tighter than `+ -`; all operators are left-associative.
    fn precedence(self) -> u8 {
        match self {
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div | Op::Mod => 2,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Op::Add => '+',
            Op::Sub => '-',
            Op::Mul => '*',
            Op::Div => '/',
            Op::Mod => '%',
        }
    }
}

/// Why a formula failed to parse.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Empty,
    UnexpectedChar(char),
    InvalidNumber(String),
    UnbalancedParens,
    UnknownFunction(String),
    /// A function name not followed by an argument list.
    BareName(String),
    /// Operator where an operand was expected. There are no unary
    /// operators, so this includes a leading minus.
    MisplacedOperator(char),
    MisplacedSeparator,
    /// Colon without cell references on both sides.
    MalformedRange,
    /// Operand where an operator was expected, empty group, or trailing
    /// operator.
    MalformedExpression,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty formula"),
            ParseError::UnexpectedChar(c) => write!(f, "unexpected character '{}'", c),
            ParseError::InvalidNumber(s) => write!(f, "invalid number '{}'", s),
            ParseError::UnbalancedParens => write!(f, "unbalanced parentheses"),
            ParseError::UnknownFunction(name) => write!(f, "unknown function or name '{}'", name),
            ParseError::BareName(name) => {
                write!(f, "function '{}' must be followed by an argument list", name)
            }
            ParseError::MisplacedOperator(c) => {
                write!(f, "operator '{}' needs a left operand", c)
            }
            ParseError::MisplacedSeparator => write!(f, "misplaced argument separator"),
            ParseError::MalformedRange => write!(f, "range must be <cell>:<cell>"),
            ParseError::MalformedExpression => write!(f, "malformed expression"),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    CellRef(Coord),
    Func(Func),
    Op(Op),
    LParen,
    RParen,
    Colon,
    Sep,
}

fn tokenize(input: &str, options: &FormulaOptions) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c == options.arg_separator {
            tokens.push(Token::Sep);
            chars.next();
            continue;
        }
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                tokens.push(Token::Op(Op::Add));
                chars.next();
            }
            '-' => {
                tokens.push(Token::Op(Op::Sub));
                chars.next();
            }
            '*' => {
                tokens.push(Token::Op(Op::Mul));
                chars.next();
            }
            '/' => {
                tokens.push(Token::Op(Op::Div));
                chars.next();
            }
            '%' => {
                tokens.push(Token::Op(Op::Mod));
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            ':' => {
                tokens.push(Token::Colon);
                chars.next();
            }
            'A'..='Z' | 'a'..='z' => {
                // Cell reference (A1) or function name (SUM). Note that a
                // name like SUMA1 reads as a cell reference (column SUMA).
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let upper = ident.to_ascii_uppercase();
                if let Some(coord) = Coord::parse(&upper) {
                    tokens.push(Token::CellRef(coord));
                } else if let Some(func) = options.resolve(&upper) {
                    tokens.push(Token::Func(func));
                } else {
                    return Err(ParseError::UnknownFunction(upper));
                }
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| ParseError::InvalidNumber(num_str.clone()))?;
                tokens.push(Token::Number(num));
            }
            _ => return Err(ParseError::UnexpectedChar(c)),
        }
    }

    Ok(tokens)
}

/// Stack frame for the operator stack: a pending binary operator, or an open
/// paren (a function's argument list when `func` is set). `arg_base` marks
/// where this group's operands start on the operand stack.
enum StackEntry {
    Op(Op),
    Paren { func: Option<Func>, arg_base: usize },
}

/// Parse formula source (leading `=` already stripped) into an expression
/// tree.
pub fn parse(src: &str, options: &FormulaOptions) -> Result<Expr, ParseError> {
    let tokens = tokenize(src, options)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut output: Vec<Expr> = Vec::new();
    let mut ops: Vec<StackEntry> = Vec::new();
    // True while the next token must be an operand: at the start of the
    // formula and after an operator, separator, or opening paren.
    let mut expect_operand = true;

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Number(n) => {
                if !expect_operand {
                    return Err(ParseError::MalformedExpression);
                }
                output.push(Expr::Number(*n));
                expect_operand = false;
            }
            Token::CellRef(start) => {
                if !expect_operand {
                    return Err(ParseError::MalformedExpression);
                }
                // Ranges are recognized at token level: ref ':' ref.
                if matches!(tokens.get(i + 1), Some(Token::Colon)) {
                    match tokens.get(i + 2) {
                        Some(Token::CellRef(end)) => {
                            output.push(Expr::Range(*start, *end));
                            i += 2;
                        }
                        _ => return Err(ParseError::MalformedRange),
                    }
                } else {
                    output.push(Expr::CellRef(*start));
                }
                expect_operand = false;
            }
            Token::Colon => return Err(ParseError::MalformedRange),
            Token::Func(func) => {
                if !expect_operand {
                    return Err(ParseError::MalformedExpression);
                }
                match tokens.get(i + 1) {
                    Some(Token::LParen) => {
                        ops.push(StackEntry::Paren {
                            func: Some(*func),
                            arg_base: output.len(),
                        });
                        i += 1;
                        expect_operand = true;
                    }
                    _ => return Err(ParseError::BareName(func.name().to_string())),
                }
            }
            Token::Op(op) => {
                if expect_operand {
                    return Err(ParseError::MisplacedOperator(op.symbol()));
                }
                while let Some(StackEntry::Op(top)) = ops.last() {
                    if top.precedence() >= op.precedence() {
                        let top = *top;
                        ops.pop();
                        apply_op(&mut output, top)?;
                    } else {
                        break;
                    }
                }
                ops.push(StackEntry::Op(*op));
                expect_operand = true;
            }
            Token::Sep => {
                if expect_operand {
                    return Err(ParseError::MisplacedSeparator);
                }
                // Resolve pending operators for the completed argument; the
                // separator must belong to a function's argument list.
                loop {
                    match ops.last() {
                        Some(StackEntry::Op(top)) => {
                            let top = *top;
                            ops.pop();
                            apply_op(&mut output, top)?;
                        }
                        Some(StackEntry::Paren { func: Some(_), .. }) => break,
                        Some(StackEntry::Paren { func: None, .. }) | None => {
                            return Err(ParseError::MisplacedSeparator)
                        }
                    }
                }
                expect_operand = true;
            }
            Token::LParen => {
                if !expect_operand {
                    return Err(ParseError::MalformedExpression);
                }
                ops.push(StackEntry::Paren {
                    func: None,
                    arg_base: output.len(),
                });
                expect_operand = true;
            }
            Token::RParen => {
                loop {
                    match ops.last() {
                        Some(StackEntry::Op(top)) => {
                            let top = *top;
                            ops.pop();
                            apply_op(&mut output, top)?;
                        }
                        Some(StackEntry::Paren { .. }) => break,
                        None => return Err(ParseError::UnbalancedParens),
                    }
                }
                let Some(StackEntry::Paren { func, arg_base }) = ops.pop() else {
                    return Err(ParseError::UnbalancedParens);
                };
                match func {
                    Some(func) => {
                        // `expect_operand` here means nothing followed the
                        // last separator (or the paren): legal only for a
                        // zero-argument call like SUM().
                        if expect_operand && output.len() > arg_base {
                            return Err(ParseError::MalformedExpression);
                        }
                        let args: Vec<Expr> = output.drain(arg_base..).collect();
                        output.push(Expr::Function { func, args });
                    }
                    None => {
                        if expect_operand || output.len() != arg_base + 1 {
                            return Err(ParseError::MalformedExpression);
                        }
                    }
                }
                expect_operand = false;
            }
        }
        i += 1;
    }

    if expect_operand {
        return Err(ParseError::MalformedExpression);
    }
    loop {
        match ops.pop() {
            Some(StackEntry::Op(op)) => apply_op(&mut output, op)?,
            Some(StackEntry::Paren { .. }) => return Err(ParseError::UnbalancedParens),
            None => break,
        }
    }
    match (output.pop(), output.is_empty()) {
        (Some(expr), true) => Ok(expr),
        _ => Err(ParseError::MalformedExpression),
    }
}

fn apply_op(output: &mut Vec<Expr>, op: Op) -> Result<(), ParseError> {
    let right = output.pop().ok_or(ParseError::MalformedExpression)?;
    let left = output.pop().ok_or(ParseError::MalformedExpression)?;
    output.push(Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(src: &str) -> Result<Expr, ParseError> {
        parse(src, &FormulaOptions::default())
    }

    fn coord(s: &str) -> Coord {
        Coord::parse(s).unwrap()
    }

    fn num(n: f64) -> Expr {
        Expr::Number(n)
    }

    fn bin(op: Op, left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn test_literal_and_cell_ref() {
        assert_eq!(parse_default("42"), Ok(num(42.0)));
        assert_eq!(parse_default("2.5"), Ok(num(2.5)));
        assert_eq!(parse_default("A1"), Ok(Expr::CellRef(coord("A1"))));
        assert_eq!(parse_default("a1"), Ok(Expr::CellRef(coord("A1"))));
    }

    #[test]
    fn test_precedence() {
        // 1+2*3 parses as 1+(2*3)
        assert_eq!(
            parse_default("1+2*3"),
            Ok(bin(Op::Add, num(1.0), bin(Op::Mul, num(2.0), num(3.0))))
        );
        // modulo binds like * and /
        assert_eq!(
            parse_default("1+6%4"),
            Ok(bin(Op::Add, num(1.0), bin(Op::Mod, num(6.0), num(4.0))))
        );
    }

    #[test]
    fn test_left_associativity() {
        // 10-2-3 parses as (10-2)-3
        assert_eq!(
            parse_default("10-2-3"),
            Ok(bin(Op::Sub, bin(Op::Sub, num(10.0), num(2.0)), num(3.0)))
        );
        assert_eq!(
            parse_default("8/4/2"),
            Ok(bin(Op::Div, bin(Op::Div, num(8.0), num(4.0)), num(2.0)))
        );
    }

    #[test]
    fn test_parens_override_precedence() {
        assert_eq!(
            parse_default("(1+2)*3"),
            Ok(bin(Op::Mul, bin(Op::Add, num(1.0), num(2.0)), num(3.0)))
        );
    }

    #[test]
    fn test_whitespace_ignored() {
        assert_eq!(parse_default(" 1 + 2 "), parse_default("1+2"));
    }

    #[test]
    fn test_range() {
        assert_eq!(
            parse_default("SUM(A1:B3)"),
            Ok(Expr::Function {
                func: Func::Sum,
                args: vec![Expr::Range(coord("A1"), coord("B3"))],
            })
        );
        // Reversed bounds parse as written; expansion normalizes them.
        assert_eq!(
            parse_default("SUM(B3:A1)"),
            Ok(Expr::Function {
                func: Func::Sum,
                args: vec![Expr::Range(coord("B3"), coord("A1"))],
            })
        );
    }

    #[test]
    fn test_function_args() {
        assert_eq!(
            parse_default("MAX(A1;B2;3)"),
            Ok(Expr::Function {
                func: Func::Max,
                args: vec![Expr::CellRef(coord("A1")), Expr::CellRef(coord("B2")), num(3.0)],
            })
        );
    }

    #[test]
    fn test_nested_function() {
        assert_eq!(
            parse_default("MAX(A1;SUM(B1;C2);5)"),
            Ok(Expr::Function {
                func: Func::Max,
                args: vec![
                    Expr::CellRef(coord("A1")),
                    Expr::Function {
                        func: Func::Sum,
                        args: vec![Expr::CellRef(coord("B1")), Expr::CellRef(coord("C2"))],
                    },
                    num(5.0),
                ],
            })
        );
    }

    #[test]
    fn test_expression_argument() {
        assert_eq!(
            parse_default("SUM(1+2;A1*3)"),
            Ok(Expr::Function {
                func: Func::Sum,
                args: vec![
                    bin(Op::Add, num(1.0), num(2.0)),
                    bin(Op::Mul, Expr::CellRef(coord("A1")), num(3.0)),
                ],
            })
        );
    }

    #[test]
    fn test_zero_argument_call() {
        assert_eq!(
            parse_default("SUM()"),
            Ok(Expr::Function {
                func: Func::Sum,
                args: vec![],
            })
        );
    }

    #[test]
    fn test_localized_names() {
        assert_eq!(parse_default("SUMA(1;2)"), parse_default("SUM(1;2)"));
        assert_eq!(parse_default("PROMEDIO(1;2)"), parse_default("AVERAGE(1;2)"));
    }

    #[test]
    fn test_custom_separator() {
        let mut options = FormulaOptions::default();
        options.arg_separator = ',';
        assert_eq!(
            parse("SUM(1,2)", &options),
            parse("SUM(1;2)", &FormulaOptions::default())
        );
    }

    #[test]
    fn test_no_unary_minus() {
        assert_eq!(parse_default("-1"), Err(ParseError::MisplacedOperator('-')));
        assert_eq!(
            parse_default("2*-3"),
            Err(ParseError::MisplacedOperator('-'))
        );
        assert_eq!(
            parse_default("SUM(-1;2)"),
            Err(ParseError::MisplacedOperator('-'))
        );
    }

    #[test]
    fn test_unbalanced_parens() {
        assert_eq!(parse_default("(1+2"), Err(ParseError::UnbalancedParens));
        assert_eq!(parse_default("1+2)"), Err(ParseError::UnbalancedParens));
        assert_eq!(parse_default("SUM(1;2"), Err(ParseError::UnbalancedParens));
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            parse_default("COUNT(A1)"),
            Err(ParseError::UnknownFunction("COUNT".to_string()))
        );
    }

    #[test]
    fn test_bare_function_name() {
        assert_eq!(
            parse_default("SUM"),
            Err(ParseError::BareName("SUM".to_string()))
        );
        assert_eq!(
            parse_default("1+MAX"),
            Err(ParseError::BareName("MAX".to_string()))
        );
    }

    #[test]
    fn test_malformed() {
        assert_eq!(parse_default("1 2"), Err(ParseError::MalformedExpression));
        assert_eq!(parse_default("1+"), Err(ParseError::MalformedExpression));
        assert_eq!(parse_default("()"), Err(ParseError::MalformedExpression));
        assert_eq!(parse_default(""), Err(ParseError::Empty));
        assert_eq!(parse_default("1;2"), Err(ParseError::MisplacedSeparator));
        assert_eq!(parse_default("SUM(1;)"), Err(ParseError::MalformedExpression));
        assert_eq!(parse_default("SUM(;1)"), Err(ParseError::MisplacedSeparator));
        assert_eq!(parse_default("A1:"), Err(ParseError::MalformedRange));
        assert_eq!(parse_default(":A1"), Err(ParseError::MalformedRange));
        assert_eq!(parse_default("A1:5"), Err(ParseError::MalformedRange));
        assert_eq!(parse_default("1&2"), Err(ParseError::UnexpectedChar('&')));
    }

    #[test]
    fn test_deeply_nested_parens() {
        // Parse depth lives on the explicit stacks, not the call stack.
        let mut src = String::new();
        for _ in 0..10_000 {
            src.push('(');
        }
        src.push('1');
        for _ in 0..10_000 {
            src.push(')');
        }
        assert_eq!(parse_default(&src), Ok(num(1.0)));
    }
}
