// Expression Engine Module
// Restricted expression grammar for <$ ... $> templates

pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;

pub use evaluator::{EvalError, Evaluated, Evaluator, ExpressionEngine};
pub use functions::{values_equal, AsyncHostFn, BuiltinFunctions, FunctionRegistry, HostFn};
pub use lexer::{
    classify, split_template, LexError, Lexer, Segment, TemplateKind, Token, CLOSE_DELIMITER,
    ESCAPE_PREFIX, OPEN_DELIMITER,
};
pub use parser::{BinaryOp, Expr, ExprParser, ParseExprError, UnaryOp};
