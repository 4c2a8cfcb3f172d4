use std::collections::VecDeque;
use std::rc::Rc;

use weave_templates::BindType;
use weave_templates::BlockType;
use weave_templates::Expression;
use weave_templates::ViewAttribute;

use crate::controller::ControllerId;
use crate::page::Task;

/// Handle to a [`Context`] in a page's [`Contexts`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The attributes a view instance was given, visible to `@name` lookups.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewScope {
    pub name: String,
    pub attributes: Vec<(String, ViewAttribute)>,
}

impl ViewScope {
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&ViewAttribute> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Whether lookups that miss here continue to the enclosing view.
    #[must_use]
    pub fn inherits(&self) -> bool {
        self.attribute("inherit").is_some() || self.attribute("extend").is_some()
    }
}

/// One evaluation scope.
#[derive(Clone, Debug)]
pub struct Context {
    pub controller: ControllerId,
    pub parent: Option<ContextId>,
    pub unbound: bool,
    pub expression: Option<Rc<Expression>>,
    pub alias: Option<String>,
    pub key_alias: Option<String>,
    /// Current position in the list, for each-block item scopes.
    pub item: Option<usize>,
    pub view: Option<Rc<ViewScope>>,
    /// The scope a passed-in template was captured in.
    pub closure: Option<ContextId>,
}

impl Context {
    fn new(controller: ControllerId, parent: Option<ContextId>, unbound: bool) -> Self {
        Self {
            controller,
            parent,
            unbound,
            expression: None,
            alias: None,
            key_alias: None,
            item: None,
            view: None,
            closure: None,
        }
    }

    /// Whether `this` inside this scope refers to the scope's own value.
    fn scopes_this(&self) -> bool {
        let Some(expression) = &self.expression else {
            return false;
        };
        match expression.block_type() {
            Some(BlockType::Each) => self.item.is_some(),
            Some(block_type) => block_type.scopes_this(),
            None => false,
        }
    }
}

/// Contexts live for as long as their page; ids are never reused.
#[derive(Debug, Default)]
pub struct Contexts {
    contexts: Vec<Context>,
}

impl Contexts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, context: Context) -> ContextId {
        let id = ContextId(u32::try_from(self.contexts.len()).unwrap_or(u32::MAX));
        self.contexts.push(context);
        id
    }

    #[must_use]
    pub fn get(&self, id: ContextId) -> &Context {
        &self.contexts[id.index()]
    }

    pub fn root(&mut self, controller: ControllerId) -> ContextId {
        self.alloc(Context::new(controller, None, false))
    }

    /// Whether a scope opened by `expression` under `parent` is unbound.
    /// Inherited unless the block overrides it.
    fn unbound(&self, parent: ContextId, expression: &Expression) -> bool {
        match (expression.block_type(), expression.bind_type()) {
            (Some(BlockType::Unbound), _) | (_, Some(BindType::Unbound)) => true,
            (Some(BlockType::Bound), _) | (_, Some(BindType::Bound)) => false,
            _ => self.get(parent).unbound,
        }
    }

    /// A block scope.
    pub fn child(&mut self, parent: ContextId, expression: Rc<Expression>) -> ContextId {
        let unbound = self.unbound(parent, &expression);
        let mut context = Context::new(self.get(parent).controller, Some(parent), unbound);
        context.alias = expression.alias().map(str::to_string);
        context.expression = Some(expression);
        self.alloc(context)
    }

    /// The scope of one item of an each block.
    pub fn each_child(
        &mut self,
        parent: ContextId,
        expression: Rc<Expression>,
        index: usize,
    ) -> ContextId {
        let unbound = self.unbound(parent, &expression);
        let mut context = Context::new(self.get(parent).controller, Some(parent), unbound);
        context.alias = expression.alias().map(str::to_string);
        context.key_alias = expression.key_alias().map(str::to_string);
        context.item = Some(index);
        context.expression = Some(expression);
        self.alloc(context)
    }

    pub fn view_child(
        &mut self,
        parent: ContextId,
        controller: ControllerId,
        scope: ViewScope,
    ) -> ContextId {
        let unbound = self.get(parent).unbound;
        let mut context = Context::new(controller, Some(parent), unbound);
        context.view = Some(Rc::new(scope));
        self.alloc(context)
    }

    /// A scope for rendering a template captured in `closure`.
    pub fn closure_child(&mut self, parent: ContextId, closure: ContextId) -> ContextId {
        let base = self.get(parent);
        let mut context = Context::new(base.controller, Some(parent), base.unbound);
        context.closure = Some(closure);
        self.alloc(context)
    }

    /// Move an item scope to `index`, or mark it removed from its list.
    pub fn set_item(&mut self, id: ContextId, index: Option<usize>) {
        self.contexts[id.index()].item = index;
    }

    #[must_use]
    pub fn item(&self, id: ContextId) -> Option<usize> {
        self.get(id).item
    }

    fn ancestors(&self, id: ContextId) -> impl Iterator<Item = ContextId> + '_ {
        std::iter::successors(Some(id), |id| self.get(*id).parent)
    }

    /// The nearest `with` scope or each item that `this` refers to.
    #[must_use]
    pub fn for_relative(&self, id: ContextId) -> Option<ContextId> {
        self.ancestors(id).find(|id| self.get(*id).scopes_this())
    }

    /// The innermost scope defining `alias` as either its value or key alias.
    #[must_use]
    pub fn for_alias(&self, id: ContextId, alias: &str) -> Option<ContextId> {
        self.ancestors(id).find(|id| {
            let context = self.get(*id);
            context.alias.as_deref() == Some(alias) || context.key_alias.as_deref() == Some(alias)
        })
    }

    /// The view scope that defines attribute `name`.
    ///
    /// Lookup stops at the first view unless that view inherits.
    #[must_use]
    pub fn for_attribute(&self, id: ContextId, name: &str) -> Option<ContextId> {
        for id in self.ancestors(id) {
            let Some(view) = &self.get(id).view else {
                continue;
            };
            if view.attribute(name).is_some() {
                return Some(id);
            }
            if !view.inherits() {
                return None;
            }
        }
        None
    }

    /// The scope just outside the nearest view instance.
    #[must_use]
    pub fn for_view_parent(&self, id: ContextId) -> Option<ContextId> {
        let mut current = Some(id);
        while let Some(id) = current {
            let context = self.get(id);
            if let Some(closure) = context.closure {
                return self.for_view_parent(closure);
            }
            if context.view.is_some() {
                return context.parent;
            }
            current = context.parent;
        }
        None
    }
}

/// Page-wide render state shared by every context: the pause depth and the
/// queue of side effects waiting for it to return to zero.
#[derive(Debug, Default)]
pub(crate) struct ContextMeta {
    pause: usize,
    queue: VecDeque<Task>,
    next_id: usize,
}

impl ContextMeta {
    pub fn pause(&mut self) {
        self.pause += 1;
    }

    /// Returns true when the page is no longer paused.
    pub fn unpause(&mut self) -> bool {
        self.pause = self.pause.saturating_sub(1);
        self.pause == 0
    }

    pub fn is_paused(&self) -> bool {
        self.pause > 0
    }

    pub fn queue(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    /// Next task to run, if the page is not paused.
    pub fn next_task(&mut self) -> Option<Task> {
        if self.is_paused() {
            return None;
        }
        self.queue.pop_front()
    }

    pub fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    pub fn reset(&mut self) {
        self.pause = 0;
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weave_templates::ExpressionKind;
    use weave_templates::ExpressionMeta;

    use super::*;

    fn block(block_type: BlockType, alias: Option<&str>) -> Rc<Expression> {
        Rc::new(
            Expression::new(ExpressionKind::Path(vec!["items".into()])).with_meta(ExpressionMeta {
                block_type: Some(block_type),
                alias: alias.map(str::to_string),
                ..ExpressionMeta::default()
            }),
        )
    }

    fn root() -> (Contexts, ContextId) {
        let mut contexts = Contexts::new();
        let root = contexts.root(ControllerId::PAGE);
        (contexts, root)
    }

    mod aliases {
        use super::*;

        #[test]
        fn test_innermost_alias_wins() {
            let (mut contexts, root) = root();
            let outer = contexts.child(root, block(BlockType::With, Some("#x")));
            let inner = contexts.child(outer, block(BlockType::With, Some("#x")));
            let leaf = contexts.child(inner, block(BlockType::If, None));
            assert_eq!(contexts.for_alias(leaf, "#x"), Some(inner));
            assert_eq!(contexts.for_alias(outer, "#x"), Some(outer));
            assert_eq!(contexts.for_alias(leaf, "#y"), None);
        }

        #[test]
        fn test_key_alias() {
            let (mut contexts, root) = root();
            let expression = Rc::new(Expression::literal(json!([1])).with_meta(ExpressionMeta {
                block_type: Some(BlockType::Each),
                alias: Some("#item".to_string()),
                key_alias: Some("#i".to_string()),
                ..ExpressionMeta::default()
            }));
            let item = contexts.each_child(root, expression, 0);
            assert_eq!(contexts.for_alias(item, "#i"), Some(item));
            assert_eq!(contexts.item(item), Some(0));
        }
    }

    mod relative {
        use super::*;

        #[test]
        fn test_if_does_not_rescope_this() {
            let (mut contexts, root) = root();
            let with = contexts.child(root, block(BlockType::With, None));
            let branch = contexts.child(with, block(BlockType::If, None));
            assert_eq!(contexts.for_relative(branch), Some(with));
        }

        #[test]
        fn test_top_level_has_no_relative_scope() {
            let (contexts, root) = root();
            assert_eq!(contexts.for_relative(root), None);
        }
    }

    mod unbound {
        use super::*;

        #[test]
        fn test_unbound_block_is_inherited_until_bound() {
            let (mut contexts, root) = root();
            let unbound = contexts.child(root, block(BlockType::Unbound, None));
            let nested = contexts.child(unbound, block(BlockType::If, None));
            let bound = contexts.child(nested, block(BlockType::Bound, None));
            assert!(contexts.get(nested).unbound);
            assert!(!contexts.get(bound).unbound);
        }

        #[test]
        fn test_each_items_honour_bind_type() {
            let (mut contexts, root) = root();
            let each = |bind_type| {
                Rc::new(Expression::path(vec!["items".into()]).with_meta(ExpressionMeta {
                    block_type: Some(BlockType::Each),
                    bind_type: Some(bind_type),
                    ..ExpressionMeta::default()
                }))
            };
            let unbound = contexts.each_child(root, each(BindType::Unbound), 0);
            assert!(contexts.get(unbound).unbound);
            let bound = contexts.each_child(unbound, each(BindType::Bound), 0);
            assert!(!contexts.get(bound).unbound);
        }
    }

    mod views {
        use super::*;

        fn scope(attributes: &[&str]) -> ViewScope {
            ViewScope {
                name: "v".to_string(),
                attributes: attributes
                    .iter()
                    .map(|name| ((*name).to_string(), ViewAttribute::Literal(json!(true))))
                    .collect(),
            }
        }

        #[test]
        fn test_attribute_lookup_stops_at_view() {
            let (mut contexts, root) = root();
            let outer = contexts.view_child(root, ControllerId::PAGE, scope(&["title"]));
            let inner = contexts.view_child(outer, ControllerId::PAGE, scope(&["label"]));
            assert_eq!(contexts.for_attribute(inner, "label"), Some(inner));
            assert_eq!(contexts.for_attribute(inner, "title"), None);
        }

        #[test]
        fn test_inherit_continues_outward() {
            let (mut contexts, root) = root();
            let outer = contexts.view_child(root, ControllerId::PAGE, scope(&["title"]));
            let inner = contexts.view_child(outer, ControllerId::PAGE, scope(&["inherit"]));
            assert_eq!(contexts.for_attribute(inner, "title"), Some(outer));
        }

        #[test]
        fn test_view_parent_follows_closures() {
            let (mut contexts, root) = root();
            let outer = contexts.view_child(root, ControllerId::PAGE, scope(&["content"]));
            let inner = contexts.view_child(outer, ControllerId::PAGE, scope(&[]));
            assert_eq!(contexts.for_view_parent(inner), Some(outer));
            let closure = contexts.closure_child(inner, outer);
            assert_eq!(contexts.for_view_parent(closure), Some(root));
        }
    }
}
