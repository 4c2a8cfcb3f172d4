use serde::Serialize;
use serde_json::Value as JsonValue;
use weave_model::Segment;

/// The block keyword an expression was written under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    If,
    Unless,
    Else,
    Each,
    With,
    On,
    Unbound,
    Bound,
}

impl BlockType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::If => "if",
            BlockType::Unless => "unless",
            BlockType::Else => "else",
            BlockType::Each => "each",
            BlockType::With => "with",
            BlockType::On => "on",
            BlockType::Unbound => "unbound",
            BlockType::Bound => "bound",
        }
    }

    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "if" => BlockType::If,
            "unless" => BlockType::Unless,
            "else" => BlockType::Else,
            "each" => BlockType::Each,
            "with" => BlockType::With,
            "on" => BlockType::On,
            "unbound" => BlockType::Unbound,
            "bound" => BlockType::Bound,
            _ => return None,
        })
    }

    /// Whether `this` inside the block refers to the block's expression.
    #[must_use]
    pub fn scopes_this(self) -> bool {
        matches!(self, BlockType::Each | BlockType::With)
    }
}

/// Binding mode override for an inline expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindType {
    Bound,
    Unbound,
}

/// Parse-time annotations carried by a top-level expression.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExpressionMeta {
    pub source: String,
    pub block_type: Option<BlockType>,
    pub bind_type: Option<BindType>,
    /// Name bound to the block value, including the leading `#`.
    pub alias: Option<String>,
    /// Name bound to the each-block index, including the leading `#`.
    pub key_alias: Option<String>,
    pub unescaped: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    Not,
    Negate,
    Positive,
    Multiply,
    Divide,
    Remainder,
    Add,
    Subtract,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    And,
    Or,
    Conditional,
}

impl Operator {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Not => "!",
            Operator::Negate => "-",
            Operator::Positive => "+",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Remainder => "%",
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::StrictEqual => "===",
            Operator::StrictNotEqual => "!==",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Conditional => "?:",
        }
    }

    /// Look an operator up by symbol. Unary and binary `+`/`-` share a symbol,
    /// so the operand count disambiguates.
    #[must_use]
    pub fn from_symbol(symbol: &str, arity: usize) -> Option<Self> {
        Some(match (symbol, arity) {
            ("!", 1) => Operator::Not,
            ("-", 1) => Operator::Negate,
            ("+", 1) => Operator::Positive,
            ("*", 2) => Operator::Multiply,
            ("/", 2) => Operator::Divide,
            ("%", 2) => Operator::Remainder,
            ("+", 2) => Operator::Add,
            ("-", 2) => Operator::Subtract,
            ("<", 2) => Operator::Less,
            (">", 2) => Operator::Greater,
            ("<=", 2) => Operator::LessEqual,
            (">=", 2) => Operator::GreaterEqual,
            ("==", 2) => Operator::Equal,
            ("!=", 2) => Operator::NotEqual,
            ("===", 2) => Operator::StrictEqual,
            ("!==", 2) => Operator::StrictNotEqual,
            ("&&", 2) => Operator::And,
            ("||", 2) => Operator::Or,
            ("?:", 3) => Operator::Conditional,
            _ => return None,
        })
    }

    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Operator::Not | Operator::Negate | Operator::Positive => 1,
            Operator::Conditional => 3,
            _ => 2,
        }
    }
}

/// An immutable expression tree, shared by every render of its template.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub meta: Option<ExpressionMeta>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ExpressionKind {
    Literal(JsonValue),
    /// A model path relative to the current controller's scope.
    Path(Vec<Segment>),
    /// `this` and members under it.
    Relative(Vec<Segment>),
    /// `#alias` and members under it. `#root` addresses the model root.
    Alias {
        alias: String,
        segments: Vec<Segment>,
    },
    /// `@attribute` and members under it.
    Attribute {
        attribute: String,
        segments: Vec<Segment>,
    },
    /// Computed member access: `before[inside].after`.
    Brackets {
        before: Box<Expression>,
        inside: Box<Expression>,
        after: Vec<Segment>,
    },
    Array(Vec<Expression>),
    Object(Vec<(String, Expression)>),
    Fn {
        name: String,
        args: Vec<Expression>,
        after: Vec<Segment>,
    },
    Operator {
        op: Operator,
        args: Vec<Expression>,
    },
    Sequence(Vec<Expression>),
    /// The always-true guard of an `else` branch.
    Else,
}

pub const ROOT_ALIAS: &str = "#root";

impl Expression {
    #[must_use]
    pub fn new(kind: ExpressionKind) -> Self {
        Self { kind, meta: None }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: ExpressionMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    #[must_use]
    pub fn literal(value: JsonValue) -> Self {
        Self::new(ExpressionKind::Literal(value))
    }

    #[must_use]
    pub fn path(segments: Vec<Segment>) -> Self {
        Self::new(ExpressionKind::Path(segments))
    }

    #[must_use]
    pub fn block_type(&self) -> Option<BlockType> {
        self.meta.as_ref().and_then(|meta| meta.block_type)
    }

    #[must_use]
    pub fn bind_type(&self) -> Option<BindType> {
        self.meta.as_ref().and_then(|meta| meta.bind_type)
    }

    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|meta| meta.alias.as_deref())
    }

    #[must_use]
    pub fn key_alias(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|meta| meta.key_alias.as_deref())
    }

    #[must_use]
    pub fn is_unescaped(&self) -> bool {
        self.meta.as_ref().is_some_and(|meta| meta.unescaped)
    }

    /// Source text, when the expression came from the parser.
    #[must_use]
    pub fn source(&self) -> &str {
        self.meta.as_ref().map_or("", |meta| meta.source.as_str())
    }

    /// Whether the expression can name a model location (and so be set).
    #[must_use]
    pub fn is_path_like(&self) -> bool {
        matches!(
            self.kind,
            ExpressionKind::Path(_)
                | ExpressionKind::Relative(_)
                | ExpressionKind::Alias { .. }
                | ExpressionKind::Attribute { .. }
                | ExpressionKind::Brackets { .. }
        )
    }

    /// Visit this expression and every nested sub-expression.
    pub fn walk(&self, visit: &mut impl FnMut(&Expression)) {
        visit(self);
        match &self.kind {
            ExpressionKind::Brackets { before, inside, .. } => {
                before.walk(visit);
                inside.walk(visit);
            }
            ExpressionKind::Array(items)
            | ExpressionKind::Sequence(items)
            | ExpressionKind::Fn { args: items, .. }
            | ExpressionKind::Operator { args: items, .. } => {
                for item in items {
                    item.walk(visit);
                }
            }
            ExpressionKind::Object(properties) => {
                for (_, value) in properties {
                    value.walk(visit);
                }
            }
            ExpressionKind::Literal(_)
            | ExpressionKind::Path(_)
            | ExpressionKind::Relative(_)
            | ExpressionKind::Alias { .. }
            | ExpressionKind::Attribute { .. }
            | ExpressionKind::Else => {}
        }
    }
}
