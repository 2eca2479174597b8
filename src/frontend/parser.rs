use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::parser_error::ParserError;
use crate::frontend::token::Token;
use crate::lang::ast::{BlockStatement, Expression, Program, Statement};

/// Binding power of infix operators, lowest first. `parse_expression` keeps
/// consuming infix operators as long as their precedence is higher than the
/// one it was called with.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn precedence_of(token: &Token) -> Precedence {
    match token {
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Slash | Token::Star => Precedence::Product,
        Token::LParen => Precedence::Call,
        Token::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// Pratt parser for Orion.
///
/// The parser consumes a stream of lexed `Spanned` tokens and produces a
/// `Program`. Statements are `let`, `return`, and expression statements;
/// everything else is an expression, including `if` and function literals.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token.
    ///
    /// Used to provide stable source locations for errors that occur after
    /// advancing past the last token or at end-of-file.
    last_span: Option<Span>,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            last_span: None,
        }
    }

    /// Returns the current token without consuming it.
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_is(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    /// Advances the token stream by one and returns the consumed token.
    ///
    /// This also updates `last_span` so EOF-related errors can still report
    /// a useful location.
    fn advance(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if let Some(s) = &spanned {
            self.last_span = Some(s.span.clone());
        }
        self.pos += 1;
        spanned
    }

    /// Constructs a `ParserError` at the most relevant location.
    ///
    /// Priority:
    /// 1. If a current token exists, use its span.
    /// 2. Else, use `last_span` (e.g. after falling off the end).
    /// 3. Else, default to (1,1) for truly empty input.
    fn error(&self, message: &str) -> ParserError {
        if let Some(spanned) = self.tokens.get(self.pos) {
            ParserError {
                message: message.to_string(),
                line: spanned.span.line,
                col: spanned.span.col,
            }
        } else if let Some(span) = &self.last_span {
            ParserError {
                message: message.to_string(),
                line: span.line,
                col: span.col,
            }
        } else {
            ParserError {
                message: message.to_string(),
                line: 1,
                col: 1,
            }
        }
    }

    /// Consumes the current token, requiring it to equal `expected`.
    /// Only used with unit tokens (delimiters, operators, keywords).
    fn expect(&mut self, expected: &Token) -> Result<(), ParserError> {
        match self.peek() {
            Some(token) if token == expected => {
                self.advance();
                Ok(())
            }
            Some(token) => Err(self.error(&format!("expected '{}', found '{}'", expected, token))),
            None => Err(self.error(&format!("expected '{}', found end of input", expected))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParserError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            Some(token) => Err(self.error(&format!("expected identifier, found '{}'", token))),
            None => Err(self.error("expected identifier, found end of input")),
        }
    }

    /// Parses a complete Orion program. Stops at `Token::Eof`.
    pub fn parse(&mut self) -> Result<Program, ParserError> {
        let mut statements = Vec::new();

        while let Some(token) = self.peek() {
            if matches!(token, Token::Eof) {
                break;
            }
            statements.push(self.parse_statement()?);
        }

        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        match self.peek() {
            Some(Token::Let) => self.parse_let_statement(),
            Some(Token::Return) => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Result<Statement, ParserError> {
        self.advance();
        let name = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_semicolon();

        Ok(Statement::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> Result<Statement, ParserError> {
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_semicolon();

        Ok(Statement::Return(value))
    }

    fn parse_expression_statement(&mut self) -> Result<Statement, ParserError> {
        let expression = self.parse_expression(Precedence::Lowest)?;
        self.skip_semicolon();

        Ok(Statement::Expression(expression))
    }

    fn skip_semicolon(&mut self) {
        if self.peek_is(&Token::Semicolon) {
            self.advance();
        }
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression, ParserError> {
        let mut left = self.parse_prefix()?;

        while let Some(token) = self.peek() {
            if matches!(token, Token::Semicolon) || precedence >= precedence_of(token) {
                break;
            }
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression, ParserError> {
        let spanned = match self.advance() {
            Some(s) => s,
            None => return Err(self.error("unexpected end of input")),
        };

        match spanned.token {
            Token::Int(value) => Ok(Expression::IntegerLiteral(value)),
            Token::Str(value) => Ok(Expression::StringLiteral(value)),
            Token::Ident(name) => Ok(Expression::Identifier(name)),
            Token::True => Ok(Expression::Boolean(true)),
            Token::False => Ok(Expression::Boolean(false)),
            Token::Bang | Token::Minus => {
                let operator = spanned.token.to_string();
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::Prefix {
                    operator,
                    right: Box::new(right),
                })
            }
            Token::LParen => {
                let expression = self.parse_expression(Precedence::Lowest)?;
                self.expect(&Token::RParen)?;
                Ok(expression)
            }
            Token::If => self.parse_if_expression(),
            Token::Function => self.parse_function_literal(),
            Token::LBracket => {
                let elements = self.parse_expression_list(&Token::RBracket)?;
                Ok(Expression::ArrayLiteral(elements))
            }
            Token::LBrace => self.parse_hash_literal(),
            other => Err(self.error(&format!("unexpected token: '{}'", other))),
        }
    }

    fn parse_infix(&mut self, left: Expression) -> Result<Expression, ParserError> {
        match self.peek() {
            Some(Token::LParen) => self.parse_call_expression(left),
            Some(Token::LBracket) => {
                self.advance();
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(&Token::RBracket)?;
                Ok(Expression::Index {
                    left: Box::new(left),
                    index: Box::new(index),
                })
            }
            Some(token) => {
                let precedence = precedence_of(token);
                let operator = token.to_string();
                self.advance();
                let right = self.parse_expression(precedence)?;
                Ok(Expression::Infix {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_if_expression(&mut self) -> Result<Expression, ParserError> {
        self.expect(&Token::LParen)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(&Token::RParen)?;

        let consequence = self.parse_block_statement()?;

        let alternative = if self.peek_is(&Token::Else) {
            self.advance();
            Some(self.parse_block_statement()?)
        } else {
            None
        };

        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_block_statement(&mut self) -> Result<BlockStatement, ParserError> {
        self.expect(&Token::LBrace)?;

        let mut statements = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                Some(Token::Eof) | None => {
                    return Err(self.error("expected '}' to close block"));
                }
                _ => statements.push(self.parse_statement()?),
            }
        }

        Ok(BlockStatement { statements })
    }

    fn parse_function_literal(&mut self) -> Result<Expression, ParserError> {
        self.expect(&Token::LParen)?;

        let mut parameters = Vec::new();
        if self.peek_is(&Token::RParen) {
            self.advance();
        } else {
            parameters.push(self.expect_ident()?);
            while self.peek_is(&Token::Comma) {
                self.advance();
                parameters.push(self.expect_ident()?);
            }
            self.expect(&Token::RParen)?;
        }

        let body = self.parse_block_statement()?;

        Ok(Expression::FunctionLiteral { parameters, body })
    }

    fn parse_call_expression(&mut self, function: Expression) -> Result<Expression, ParserError> {
        self.advance();
        let arguments = self.parse_expression_list(&Token::RParen)?;

        Ok(Expression::Call {
            function: Box::new(function),
            arguments,
        })
    }

    /// Parses a comma-separated expression list up to (and including) `end`.
    /// The opening delimiter must already be consumed.
    fn parse_expression_list(&mut self, end: &Token) -> Result<Vec<Expression>, ParserError> {
        let mut list = Vec::new();

        if self.peek_is(end) {
            self.advance();
            return Ok(list);
        }

        list.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek_is(&Token::Comma) {
            self.advance();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect(end)?;

        Ok(list)
    }

    fn parse_hash_literal(&mut self) -> Result<Expression, ParserError> {
        let mut pairs = Vec::new();

        if self.peek_is(&Token::RBrace) {
            self.advance();
            return Ok(Expression::HashLiteral(pairs));
        }

        loop {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(&Token::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if self.peek_is(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RBrace)?;

        Ok(Expression::HashLiteral(pairs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(source: &str) -> Program {
        let tokens = Lexer::new(source).tokenize().expect("lexing should succeed");
        Parser::new(tokens).parse().expect("parsing should succeed")
    }

    fn parse_error(source: &str) -> ParserError {
        let tokens = Lexer::new(source).tokenize().expect("lexing should succeed");
        Parser::new(tokens)
            .parse()
            .expect_err("parsing should fail")
    }

    /// Parses a single expression statement and returns the expression.
    fn parse_expr(source: &str) -> Expression {
        let program = parse(source);
        assert_eq!(program.statements.len(), 1, "want a single statement");
        match program.statements.into_iter().next().unwrap() {
            Statement::Expression(expression) => expression,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_let_statements() {
        let program = parse("let x = 5; let y = true; let foobar = y;");

        assert_eq!(program.statements.len(), 3);
        assert_eq!(
            program.statements[0],
            Statement::Let {
                name: "x".to_string(),
                value: Expression::IntegerLiteral(5),
            }
        );
        assert_eq!(
            program.statements[2],
            Statement::Let {
                name: "foobar".to_string(),
                value: Expression::Identifier("y".to_string()),
            }
        );
    }

    #[test]
    fn test_return_statement() {
        let program = parse("return 10;");
        assert_eq!(
            program.statements[0],
            Statement::Return(Expression::IntegerLiteral(10))
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_expr("5"), Expression::IntegerLiteral(5));
        assert_eq!(parse_expr("true"), Expression::Boolean(true));
        assert_eq!(
            parse_expr(r#""hello""#),
            Expression::StringLiteral("hello".to_string())
        );
        assert_eq!(
            parse_expr("foobar"),
            Expression::Identifier("foobar".to_string())
        );
    }

    #[test]
    fn test_prefix_expressions() {
        assert_eq!(parse_expr("!5").to_string(), "(!5)");
        assert_eq!(parse_expr("-15").to_string(), "(-15)");
        assert_eq!(parse_expr("!!true").to_string(), "(!(!true))");
    }

    #[test]
    fn test_operator_precedence() {
        let cases = [
            ("-a * b", "((-a) * b)"),
            ("a + b + c", "((a + b) + c)"),
            ("a + b * c", "(a + (b * c))"),
            ("a + b / c", "(a + (b / c))"),
            ("5 > 4 == 3 < 4", "((5 > 4) == (3 < 4))"),
            ("3 + 4 * 5 == 3 * 1 + 4 * 5", "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))"),
            ("(5 + 5) * 2", "((5 + 5) * 2)"),
            ("-(5 + 5)", "(-(5 + 5))"),
            ("!(true == true)", "(!(true == true))"),
            ("a + add(b * c) + d", "((a + add((b * c))) + d)"),
            ("a * [1, 2, 3, 4][b * c] * d", "((a * ([1, 2, 3, 4][(b * c)])) * d)"),
            ("add(a * b[2], b[1], 2 * [1, 2][1])", "add((a * (b[2])), (b[1]), (2 * ([1, 2][1])))"),
        ];

        for (source, expected) in cases {
            assert_eq!(parse_expr(source).to_string(), expected, "source: {}", source);
        }
    }

    #[test]
    fn test_if_expression() {
        let expression = parse_expr("if (x < y) { x }");
        match expression {
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                assert_eq!(condition.to_string(), "(x < y)");
                assert_eq!(consequence.statements.len(), 1);
                assert!(alternative.is_none());
            }
            other => panic!("expected if expression, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_expression() {
        let expression = parse_expr("if (x < y) { x } else { y }");
        match expression {
            Expression::If { alternative, .. } => {
                let alternative = alternative.expect("alternative should be present");
                assert_eq!(alternative.statements.len(), 1);
            }
            other => panic!("expected if expression, got {:?}", other),
        }
    }

    #[test]
    fn test_function_literal() {
        let expression = parse_expr("fn(x, y) { x + y; }");
        match expression {
            Expression::FunctionLiteral { parameters, body } => {
                assert_eq!(parameters, vec!["x".to_string(), "y".to_string()]);
                assert_eq!(body.statements.len(), 1);
            }
            other => panic!("expected function literal, got {:?}", other),
        }
    }

    #[test]
    fn test_function_parameter_lists() {
        let cases: [(&str, &[&str]); 3] = [
            ("fn() {};", &[]),
            ("fn(x) {};", &["x"]),
            ("fn(x, y, z) {};", &["x", "y", "z"]),
        ];

        for (source, expected) in cases {
            match parse_expr(source) {
                Expression::FunctionLiteral { parameters, .. } => {
                    assert_eq!(parameters, expected, "source: {}", source);
                }
                other => panic!("expected function literal, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_call_expression() {
        let expression = parse_expr("add(1, 2 * 3, 4 + 5)");
        match expression {
            Expression::Call {
                function,
                arguments,
            } => {
                assert_eq!(function.to_string(), "add");
                assert_eq!(arguments.len(), 3);
                assert_eq!(arguments[1].to_string(), "(2 * 3)");
            }
            other => panic!("expected call expression, got {:?}", other),
        }
    }

    #[test]
    fn test_array_literal() {
        let expression = parse_expr("[1, 2 * 2, 3 + 3]");
        assert_eq!(expression.to_string(), "[1, (2 * 2), (3 + 3)]");
    }

    #[test]
    fn test_empty_array_literal() {
        assert_eq!(parse_expr("[]"), Expression::ArrayLiteral(vec![]));
    }

    #[test]
    fn test_index_expression() {
        let expression = parse_expr("myArray[1 + 1]");
        assert_eq!(expression.to_string(), "(myArray[(1 + 1)])");
    }

    #[test]
    fn test_hash_literal() {
        let expression = parse_expr(r#"{"one": 1, "two": 2, "three": 3}"#);
        match expression {
            Expression::HashLiteral(pairs) => {
                assert_eq!(pairs.len(), 3);
                assert_eq!(pairs[0].0.to_string(), "one");
                assert_eq!(pairs[0].1.to_string(), "1");
            }
            other => panic!("expected hash literal, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_hash_literal() {
        assert_eq!(parse_expr("{}"), Expression::HashLiteral(vec![]));
    }

    #[test]
    fn test_hash_literal_with_expressions() {
        let expression = parse_expr(r#"{"one": 0 + 1, "two": 10 - 8}"#);
        match expression {
            Expression::HashLiteral(pairs) => {
                assert_eq!(pairs[0].1.to_string(), "(0 + 1)");
                assert_eq!(pairs[1].1.to_string(), "(10 - 8)");
            }
            other => panic!("expected hash literal, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_assign_in_let() {
        let err = parse_error("let x 5;");
        assert!(err.message.contains("expected '='"));
    }

    #[test]
    fn test_unclosed_paren() {
        let err = parse_error("(1 + 2");
        assert!(err.message.contains("expected ')'"));
    }

    #[test]
    fn test_unclosed_block_reports_location() {
        let err = parse_error("if (true) { 1 ");
        assert!(err.message.contains("expected '}'"));
        assert_eq!(err.line, 1);
    }
}
