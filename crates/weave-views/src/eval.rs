use std::fmt;

use weave_model::Model;
use weave_model::Path;
use weave_model::Segment;
use weave_templates::Expression;
use weave_templates::ExpressionKind;
use weave_templates::Operator;
use weave_templates::ViewAttribute;
use weave_templates::ROOT_ALIAS;

use crate::app::App;
use crate::contexts::ContextId;
use crate::contexts::Contexts;
use crate::controller::Controllers;
use crate::controller::Function;
use crate::error::ViewError;
use crate::value::apply_operator;
use crate::value::object;
use crate::value::TemplateValue;
use crate::value::Value;

/// One segment of a resolved model path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    /// The list position currently held by an each-block item. Tracks the
    /// item through inserts, removes and moves.
    Item(ContextId),
    /// Anything below this point. Only appears in dependencies.
    Wildcard,
}

impl From<&Segment> for PathSegment {
    fn from(segment: &Segment) -> Self {
        match segment {
            Segment::Key(key) => PathSegment::Key(key.clone()),
            Segment::Index(index) => PathSegment::Index(*index),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
            PathSegment::Item(context) => write!(f, "<item {context}>"),
            PathSegment::Wildcard => f.write_str("*"),
        }
    }
}

pub type ResolvedPath = Vec<PathSegment>;

/// Ref chains longer than this are treated as cycles.
const MAX_REF_DEPTH: usize = 16;

/// Evaluates expressions against one page's state. Evaluation never mutates.
pub(crate) struct Evaluator<'a> {
    pub model: &'a Model,
    pub contexts: &'a Contexts,
    pub controllers: &'a Controllers,
    pub app: &'a App,
}

impl Evaluator<'_> {
    pub fn get(&self, expression: &Expression, context: ContextId) -> Result<Value, ViewError> {
        match &expression.kind {
            ExpressionKind::Literal(value) => Ok(Value::Json(value.clone())),
            ExpressionKind::Path(_) => Ok(self.lookup_expression(expression, context)),
            ExpressionKind::Relative(segments) => {
                if let Some(path) = self.resolve(expression, context) {
                    return Ok(self.lookup(&path));
                }
                match self.contexts.for_relative(context) {
                    Some(scope) => Ok(self.scope_value(scope)?.member(segments)),
                    None => Ok(Value::Undefined),
                }
            }
            ExpressionKind::Alias { alias, segments } => {
                let Some(scope) = self.contexts.for_alias(context, alias) else {
                    return Ok(self.lookup_expression(expression, context));
                };
                let scope_context = self.contexts.get(scope);
                if scope_context.key_alias.as_deref() == Some(alias.as_str()) {
                    return Ok(scope_context.item.map_or(Value::Undefined, Value::from));
                }
                if let Some(path) = self.resolve(expression, context) {
                    return Ok(self.lookup(&path));
                }
                Ok(self.scope_value(scope)?.member(segments))
            }
            ExpressionKind::Attribute {
                attribute,
                segments,
            } => {
                let Some(scope) = self.contexts.for_attribute(context, attribute) else {
                    return Ok(Value::Undefined);
                };
                Ok(self.attribute_value(scope, attribute)?.member(segments))
            }
            ExpressionKind::Brackets {
                before,
                inside,
                after,
            } => {
                if let Some(path) = self.resolve(expression, context) {
                    return Ok(self.lookup(&path));
                }
                let Some(segment) = self.get(inside, context)?.to_segment() else {
                    return Ok(Value::Undefined);
                };
                Ok(self.get(before, context)?.member(&[segment]).member(after))
            }
            ExpressionKind::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.get(item, context).map(Value::into_json))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Json(values.into()))
            }
            ExpressionKind::Object(properties) => {
                let values = properties
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), self.get(value, context)?)))
                    .collect::<Result<Vec<_>, ViewError>>()?;
                Ok(object(values))
            }
            ExpressionKind::Fn { name, args, after } => {
                let function = self.function(context, name)?;
                let values = self.get_all(args, context)?;
                Ok(function(&values)?.member(after))
            }
            ExpressionKind::Operator { op, args } => self.operate(*op, args, context),
            ExpressionKind::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.get(item, context)?;
                }
                Ok(last)
            }
            ExpressionKind::Else => Ok(Value::from(true)),
        }
    }

    pub fn get_all(
        &self,
        expressions: &[Expression],
        context: ContextId,
    ) -> Result<Vec<Value>, ViewError> {
        expressions
            .iter()
            .map(|expression| self.get(expression, context))
            .collect()
    }

    /// The single model location `expression` names, if there is one.
    pub fn resolve(&self, expression: &Expression, context: ContextId) -> Option<ResolvedPath> {
        match &expression.kind {
            ExpressionKind::Path(segments) => Some(self.scoped(context, segments)),
            ExpressionKind::Relative(segments) => match self.contexts.for_relative(context) {
                Some(scope) => Some(extend(self.scope_path(scope)?, segments)),
                None => Some(self.scoped(context, segments)),
            },
            ExpressionKind::Alias { alias, segments } => {
                match self.contexts.for_alias(context, alias) {
                    Some(scope)
                        if self.contexts.get(scope).key_alias.as_deref() == Some(alias.as_str()) =>
                    {
                        None
                    }
                    Some(scope) => Some(extend(self.scope_path(scope)?, segments)),
                    None if alias == ROOT_ALIAS => {
                        Some(segments.iter().map(PathSegment::from).collect())
                    }
                    None => None,
                }
            }
            ExpressionKind::Attribute {
                attribute,
                segments,
            } => {
                let scope = self.contexts.for_attribute(context, attribute)?;
                let view = self.contexts.get(scope).view.as_ref()?;
                match view.attribute(attribute)? {
                    ViewAttribute::Expression(inner) => {
                        let outer = self.contexts.for_view_parent(scope).unwrap_or(scope);
                        Some(extend(self.resolve(inner, outer)?, segments))
                    }
                    ViewAttribute::Literal(_) | ViewAttribute::Template(_) => None,
                }
            }
            ExpressionKind::Brackets {
                before,
                inside,
                after,
            } => {
                let mut path = self.resolve(before, context)?;
                let segment = self.get(inside, context).ok()?.to_segment()?;
                path.push(PathSegment::from(&segment));
                Some(self.dereference(extend(path, after)))
            }
            ExpressionKind::Sequence(items) => self.resolve(items.last()?, context),
            ExpressionKind::Literal(_)
            | ExpressionKind::Array(_)
            | ExpressionKind::Object(_)
            | ExpressionKind::Fn { .. }
            | ExpressionKind::Operator { .. }
            | ExpressionKind::Else => None,
        }
    }

    /// Model paths whose mutation can change the value of `expression`.
    pub fn dependencies(&self, expression: &Expression, context: ContextId) -> Vec<ResolvedPath> {
        match &expression.kind {
            ExpressionKind::Literal(_) | ExpressionKind::Else => Vec::new(),
            ExpressionKind::Path(_) => self.resolve(expression, context).into_iter().collect(),
            ExpressionKind::Relative(_) => match self.contexts.for_relative(context) {
                Some(scope) => {
                    self.swap_last(self.scope_dependencies(scope), expression, context)
                }
                None => self.resolve(expression, context).into_iter().collect(),
            },
            ExpressionKind::Alias { alias, .. } => match self.contexts.for_alias(context, alias) {
                Some(scope)
                    if self.contexts.get(scope).key_alias.as_deref() == Some(alias.as_str()) =>
                {
                    self.scope_dependencies(scope)
                }
                Some(scope) => self.swap_last(self.scope_dependencies(scope), expression, context),
                None => self.resolve(expression, context).into_iter().collect(),
            },
            ExpressionKind::Attribute { attribute, .. } => {
                let Some(scope) = self.contexts.for_attribute(context, attribute) else {
                    return Vec::new();
                };
                let inner = self
                    .contexts
                    .get(scope)
                    .view
                    .as_ref()
                    .and_then(|view| view.attribute(attribute));
                match inner {
                    Some(ViewAttribute::Expression(inner)) => {
                        let outer = self.contexts.for_view_parent(scope).unwrap_or(scope);
                        self.swap_last(self.dependencies(inner, outer), expression, context)
                    }
                    _ => Vec::new(),
                }
            }
            ExpressionKind::Brackets { before, inside, .. } => {
                let mut dependencies = self.dependencies(before, context);
                dependencies.pop();
                dependencies.extend(self.dependencies(inside, context));
                dependencies.extend(self.resolve(expression, context));
                dependencies
            }
            ExpressionKind::Fn { args, .. } => {
                let mut dependencies = Vec::new();
                for arg in args {
                    let mut inner = self.dependencies(arg, context);
                    if let Some(last) = inner.last_mut() {
                        last.push(PathSegment::Wildcard);
                    }
                    dependencies.extend(inner);
                }
                dependencies
            }
            ExpressionKind::Array(items)
            | ExpressionKind::Sequence(items)
            | ExpressionKind::Operator { args: items, .. } => items
                .iter()
                .flat_map(|item| self.dependencies(item, context))
                .collect(),
            ExpressionKind::Object(properties) => properties
                .iter()
                .flat_map(|(_, value)| self.dependencies(value, context))
                .collect(),
        }
    }

    /// Replace the last dependency of a scope with the concrete path itself.
    fn swap_last(
        &self,
        mut dependencies: Vec<ResolvedPath>,
        expression: &Expression,
        context: ContextId,
    ) -> Vec<ResolvedPath> {
        if let Some(path) = self.resolve(expression, context) {
            dependencies.pop();
            dependencies.push(path);
        }
        dependencies
    }

    /// Dependencies of the block expression that created `scope`.
    fn scope_dependencies(&self, scope: ContextId) -> Vec<ResolvedPath> {
        let context = self.contexts.get(scope);
        match (&context.expression, context.parent) {
            (Some(expression), Some(parent)) => self.dependencies(expression, parent),
            _ => Vec::new(),
        }
    }

    /// Path of the value `this` or an alias refers to in `scope`.
    fn scope_path(&self, scope: ContextId) -> Option<ResolvedPath> {
        let context = self.contexts.get(scope);
        let mut path = self.resolve(context.expression.as_ref()?, context.parent?)?;
        if context.item.is_some() {
            path.push(PathSegment::Item(scope));
        }
        Some(path)
    }

    /// Value of `this` or an alias in `scope`, for scopes with no model path.
    fn scope_value(&self, scope: ContextId) -> Result<Value, ViewError> {
        let context = self.contexts.get(scope);
        let (Some(expression), Some(parent)) = (&context.expression, context.parent) else {
            return Ok(Value::Undefined);
        };
        let value = self.get(expression, parent)?;
        Ok(match context.item {
            Some(index) => value.member(&[Segment::Index(index)]),
            None => value,
        })
    }

    fn attribute_value(&self, scope: ContextId, name: &str) -> Result<Value, ViewError> {
        let Some(view) = &self.contexts.get(scope).view else {
            return Ok(Value::Undefined);
        };
        match view.attribute(name) {
            Some(ViewAttribute::Literal(value)) => Ok(Value::Json(value.clone())),
            Some(ViewAttribute::Expression(inner)) => {
                let outer = self.contexts.for_view_parent(scope).unwrap_or(scope);
                self.get(inner, outer)
            }
            Some(ViewAttribute::Template(template)) => Ok(Value::Template(TemplateValue {
                template: template.clone(),
                closure: Some(scope),
            })),
            None => Ok(Value::Undefined),
        }
    }

    fn operate(
        &self,
        op: Operator,
        args: &[Expression],
        context: ContextId,
    ) -> Result<Value, ViewError> {
        let arg = |i: usize| {
            args.get(i)
                .map_or(Ok(Value::Undefined), |arg| self.get(arg, context))
        };
        match op {
            Operator::And => {
                let first = arg(0)?;
                if first.is_truthy() {
                    arg(1)
                } else {
                    Ok(first)
                }
            }
            Operator::Or => {
                let first = arg(0)?;
                if first.is_truthy() {
                    Ok(first)
                } else {
                    arg(1)
                }
            }
            Operator::Conditional => {
                if arg(0)?.is_truthy() {
                    arg(1)
                } else {
                    arg(2)
                }
            }
            _ => Ok(apply_operator(op, &self.get_all(args, context)?)),
        }
    }

    /// Component functions shadow app functions of the same name.
    pub fn function(&self, context: ContextId, name: &str) -> Result<Function, ViewError> {
        let controller = self.contexts.get(context).controller;
        self.controllers
            .function(controller, name)
            .or_else(|| self.app.find_function(name))
            .ok_or_else(|| ViewError::UnknownFunction(name.to_string()))
    }

    /// `segments` under the scope of the controller owning `context`.
    fn scoped(&self, context: ContextId, segments: &[Segment]) -> ResolvedPath {
        let controller = self.controllers.get(self.contexts.get(context).controller);
        let path = controller
            .scope()
            .segments()
            .iter()
            .chain(segments)
            .map(PathSegment::from)
            .collect();
        self.dereference(path)
    }

    /// Follow component attribute refs to the path they alias.
    pub fn dereference(&self, mut path: ResolvedPath) -> ResolvedPath {
        let components = self.app.settings().components_path.as_str();
        for _ in 0..MAX_REF_DEPTH {
            let [PathSegment::Key(root), PathSegment::Key(id), PathSegment::Key(key), ..] =
                path.as_slice()
            else {
                break;
            };
            if root != components {
                break;
            }
            let Some(controller) = self.controllers.by_id(id) else {
                break;
            };
            let Some((_, target)) = self
                .controllers
                .get(controller)
                .refs
                .iter()
                .find(|(name, _)| name == key)
            else {
                break;
            };
            let mut next = target.clone();
            next.extend(path.drain(3..));
            path = next;
        }
        path
    }

    /// The concrete model path for a resolved path at this moment.
    pub fn model_path(&self, path: &[PathSegment]) -> Option<Path> {
        path.iter()
            .map(|segment| match segment {
                PathSegment::Key(key) => Some(Segment::Key(key.clone())),
                PathSegment::Index(index) => Some(Segment::Index(*index)),
                PathSegment::Item(context) => self.contexts.item(*context).map(Segment::Index),
                PathSegment::Wildcard => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Path::new)
    }

    pub fn lookup(&self, path: &[PathSegment]) -> Value {
        self.model_path(path)
            .and_then(|path| self.model.get(&path).cloned())
            .map_or(Value::Undefined, Value::Json)
    }

    fn lookup_expression(&self, expression: &Expression, context: ContextId) -> Value {
        self.resolve(expression, context)
            .map_or(Value::Undefined, |path| self.lookup(&path))
    }
}

fn extend(mut path: ResolvedPath, segments: &[Segment]) -> ResolvedPath {
    path.extend(segments.iter().map(PathSegment::from));
    path
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use serde_json::json;
    use weave_templates::parse_expression;
    use weave_templates::BlockType;
    use weave_templates::ExpressionMeta;

    use super::*;
    use crate::controller::ControllerId;

    struct Fixture {
        model: Model,
        contexts: Contexts,
        controllers: Controllers,
        app: App,
        root: ContextId,
    }

    impl Fixture {
        fn new(data: serde_json::Value) -> Self {
            let mut contexts = Contexts::new();
            let root = contexts.root(ControllerId::PAGE);
            let mut app = App::new("test");
            app.function("plus", |args| {
                Ok(Value::from(args.iter().map(Value::to_number).sum::<f64>()))
            });
            Self {
                model: Model::from_json(data).unwrap(),
                contexts,
                controllers: Controllers::new(),
                app,
                root,
            }
        }

        fn eval(&self) -> Evaluator<'_> {
            Evaluator {
                model: &self.model,
                contexts: &self.contexts,
                controllers: &self.controllers,
                app: &self.app,
            }
        }

        fn block(source: &str, block_type: BlockType, alias: Option<&str>) -> Rc<Expression> {
            let expression = parse_expression(source).unwrap();
            Rc::new(expression.with_meta(ExpressionMeta {
                source: source.to_string(),
                block_type: Some(block_type),
                alias: alias.map(str::to_string),
                key_alias: (block_type == BlockType::Each).then(|| "#i".to_string()),
                ..ExpressionMeta::default()
            }))
        }
    }

    fn deps(fixture: &Fixture, source: &str, context: ContextId) -> Vec<String> {
        let expression = parse_expression(source).unwrap();
        fixture
            .eval()
            .dependencies(&expression, context)
            .iter()
            .map(|path| {
                path.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .collect()
    }

    fn get(fixture: &Fixture, source: &str, context: ContextId) -> Value {
        let expression = parse_expression(source).unwrap();
        fixture.eval().get(&expression, context).unwrap()
    }

    mod paths {
        use super::*;

        #[test]
        fn test_simple_path() {
            let fixture = Fixture::new(json!({"_page": {"key": "green"}}));
            assert_eq!(deps(&fixture, "_page.key", fixture.root), vec!["_page.key"]);
            assert_eq!(get(&fixture, "_page.key", fixture.root), Value::from("green"));
        }

        #[test]
        fn test_brackets_track_key_and_target() {
            let fixture = Fixture::new(json!({
                "_page": {"key": "green", "colors": {"green": {"name": "Green"}}}
            }));
            let source = "_page.colors[_page.key].name";
            assert_eq!(
                deps(&fixture, source, fixture.root),
                vec!["_page.key", "_page.colors.green.name"]
            );
            assert_eq!(get(&fixture, source, fixture.root), Value::from("Green"));
        }

        #[test]
        fn test_missing_path_is_undefined() {
            let fixture = Fixture::new(json!({}));
            assert_eq!(get(&fixture, "_page.nope.deeper", fixture.root), Value::Undefined);
        }

        #[test]
        fn test_root_alias_is_absolute() {
            let fixture = Fixture::new(json!({"_session": {"user": "ann"}}));
            assert_eq!(get(&fixture, "#root._session.user", fixture.root), Value::from("ann"));
        }
    }

    mod functions {
        use super::*;

        #[test]
        fn test_arguments_depend_on_whole_subtree() {
            let fixture = Fixture::new(json!({"_page": {"nums": [2, 3]}}));
            let source = "plus(_page.nums[0], _page.nums[1])";
            assert_eq!(
                deps(&fixture, source, fixture.root),
                vec!["_page.nums.0.*", "_page.nums.1.*"]
            );
            assert_eq!(get(&fixture, source, fixture.root), Value::from(5.0));
        }

        #[test]
        fn test_unknown_function() {
            let fixture = Fixture::new(json!({}));
            let expression = parse_expression("nope(1)").unwrap();
            assert_eq!(
                fixture.eval().get(&expression, fixture.root),
                Err(ViewError::UnknownFunction("nope".to_string()))
            );
        }

        #[test]
        fn test_literal_has_no_dependencies() {
            let fixture = Fixture::new(json!({}));
            assert!(deps(&fixture, "plus(1, 2)", fixture.root).is_empty());
        }
    }

    mod scopes {
        use super::*;

        #[test]
        fn test_each_item_resolves_through_item_segment() {
            let mut fixture = Fixture::new(json!({"_page": {"items": ["a", "b"]}}));
            let list = Fixture::block("_page.items", BlockType::Each, Some("#item"));
            let item = fixture.contexts.each_child(fixture.root, list, 1);
            assert_eq!(get(&fixture, "this", item), Value::from("b"));
            assert_eq!(get(&fixture, "#item", item), Value::from("b"));
            assert_eq!(get(&fixture, "#i", item), Value::from(1_usize));
            assert_eq!(
                fixture.eval().resolve(&parse_expression("this").unwrap(), item),
                Some(vec![
                    PathSegment::Key("_page".to_string()),
                    PathSegment::Key("items".to_string()),
                    PathSegment::Item(item),
                ])
            );
            assert_eq!(deps(&fixture, "#i", item), vec!["_page.items"]);
        }

        #[test]
        fn test_item_follows_index_changes() {
            let mut fixture = Fixture::new(json!({"_page": {"items": ["a", "b", "c"]}}));
            let list = Fixture::block("_page.items", BlockType::Each, None);
            let item = fixture.contexts.each_child(fixture.root, list, 0);
            fixture.contexts.set_item(item, Some(2));
            assert_eq!(get(&fixture, "this", item), Value::from("c"));
        }

        #[test]
        fn test_with_alias_shadowing() {
            let mut fixture = Fixture::new(json!({"_page": {"a": {"n": 1}, "b": {"n": 2}}}));
            let outer = Fixture::block("_page.a", BlockType::With, Some("#x"));
            let outer = fixture.contexts.child(fixture.root, outer);
            let inner = Fixture::block("_page.b", BlockType::With, Some("#x"));
            let inner = fixture.contexts.child(outer, inner);
            assert_eq!(get(&fixture, "#x.n", inner), Value::from(2.0));
            assert_eq!(get(&fixture, "#x.n", outer), Value::from(1.0));
            assert_eq!(deps(&fixture, "#x.n", inner), vec!["_page.b.n"]);
        }

        #[test]
        fn test_relative_in_literal_list() {
            let mut fixture = Fixture::new(json!({}));
            let list = Fixture::block("[1, 2, 3]", BlockType::Each, None);
            let item = fixture.contexts.each_child(fixture.root, list, 2);
            assert_eq!(get(&fixture, "this", item), Value::from(3.0));
            assert!(deps(&fixture, "this", item).is_empty());
        }

        #[test]
        fn test_missing_alias_has_no_dependencies() {
            let fixture = Fixture::new(json!({}));
            assert!(deps(&fixture, "#nope.x", fixture.root).is_empty());
            assert_eq!(get(&fixture, "#nope.x", fixture.root), Value::Undefined);
        }
    }

    mod operators {
        use super::*;

        #[test]
        fn test_operator_dependencies_concatenate() {
            let fixture = Fixture::new(json!({"_page": {"a": 1, "b": 2}}));
            assert_eq!(
                deps(&fixture, "_page.a + _page.b", fixture.root),
                vec!["_page.a", "_page.b"]
            );
            assert_eq!(get(&fixture, "_page.a + _page.b", fixture.root), Value::from(3.0));
        }

        #[test]
        fn test_short_circuit_skips_unknown_function() {
            let fixture = Fixture::new(json!({}));
            assert_eq!(get(&fixture, "false && nope()", fixture.root), Value::from(false));
        }

        #[test]
        fn test_operators_are_not_settable() {
            let fixture = Fixture::new(json!({}));
            let expression = parse_expression("_page.a + 1").unwrap();
            assert_eq!(fixture.eval().resolve(&expression, fixture.root), None);
        }
    }
}
