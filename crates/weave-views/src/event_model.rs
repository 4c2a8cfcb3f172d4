use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use weave_model::Segment;

use crate::bindings::BindingId;
use crate::contexts::ContextId;
use crate::contexts::Contexts;
use crate::eval::PathSegment;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct EventNodeId(u32);

impl EventNodeId {
    const ROOT: EventNodeId = EventNodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A structural change to a list, delivered to the bindings registered on the list itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ListChange {
    Insert { index: usize, how_many: usize },
    Remove { index: usize, how_many: usize },
    Move { from: usize, to: usize, how_many: usize },
}

impl ListChange {
    /// Where the item at `index` sits after the change, `None` once removed.
    fn shift(self, index: usize) -> Option<usize> {
        match self {
            ListChange::Insert { index: at, how_many } if index >= at => {
                Some(index.saturating_add(how_many))
            }
            ListChange::Insert { .. } => Some(index),
            ListChange::Remove { index: at, how_many } => {
                if index < at {
                    Some(index)
                } else if index - at < how_many {
                    None
                } else {
                    Some(index - how_many)
                }
            }
            ListChange::Move { from, to, how_many } => {
                if index >= from && index - from < how_many {
                    return Some(to + (index - from));
                }
                let rest = if index >= from { index - how_many } else { index };
                Some(if rest >= to { rest + how_many } else { rest })
            }
        }
    }

    /// First index whose by-value children now see a different item.
    fn first_changed(self) -> usize {
        match self {
            ListChange::Insert { index, .. } | ListChange::Remove { index, .. } => index,
            ListChange::Move { from, to, .. } => from.min(to),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Notification {
    Update,
    List(ListChange),
}

#[derive(Debug, Default)]
struct EventNode {
    object: FxHashMap<String, EventNodeId>,
    /// Children addressed by index: they see whatever value sits at that index.
    array: Vec<Option<EventNodeId>>,
    /// Children addressed through an each-block item. They move with the item.
    by_reference: Vec<Option<EventNodeId>>,
    wildcard: Option<EventNodeId>,
    bindings: Vec<BindingId>,
    /// Each-block item scopes rendered from the list at this node.
    items: Vec<ContextId>,
}

impl EventNode {
    fn is_empty(&self) -> bool {
        self.bindings.is_empty()
            && self.object.is_empty()
            && self.wildcard.is_none()
            && self.array.iter().all(Option::is_none)
            && self.by_reference.iter().all(Option::is_none)
    }
}

/// Index from model paths to the bindings that depend on them.
///
/// Nodes are created as paths are first registered and never freed; a node
/// left with nothing under it is only skipped.
#[derive(Debug)]
pub(crate) struct EventModel {
    nodes: Vec<EventNode>,
}

impl Default for EventModel {
    fn default() -> Self {
        Self {
            nodes: vec![EventNode::default()],
        }
    }
}

fn index_of(key: &str) -> Option<usize> {
    key.parse().ok().filter(|_| !key.starts_with('+'))
}

fn slot(slots: &mut Vec<Option<EventNodeId>>, index: usize) -> &mut Option<EventNodeId> {
    if slots.len() <= index {
        slots.resize(index + 1, None);
    }
    &mut slots[index]
}

impl EventModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, id: EventNodeId) -> &EventNode {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: EventNodeId) -> &mut EventNode {
        &mut self.nodes[id.index()]
    }

    fn alloc(&mut self) -> EventNodeId {
        let id = EventNodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(EventNode::default());
        id
    }

    fn child(
        &mut self,
        parent: EventNodeId,
        segment: &PathSegment,
        contexts: &Contexts,
    ) -> Option<EventNodeId> {
        let existing = match segment {
            PathSegment::Key(key) => match index_of(key) {
                Some(index) => *slot(&mut self.node_mut(parent).array, index),
                None => self.node(parent).object.get(key).copied(),
            },
            PathSegment::Index(index) => *slot(&mut self.node_mut(parent).array, *index),
            PathSegment::Item(context) => {
                let index = contexts.item(*context)?;
                *slot(&mut self.node_mut(parent).by_reference, index)
            }
            PathSegment::Wildcard => self.node(parent).wildcard,
        };
        if existing.is_some() {
            return existing;
        }

        let id = self.alloc();
        let node = self.node_mut(parent);
        match segment {
            PathSegment::Key(key) => match index_of(key) {
                Some(index) => *slot(&mut node.array, index) = Some(id),
                None => {
                    node.object.insert(key.clone(), id);
                }
            },
            PathSegment::Index(index) => *slot(&mut node.array, *index) = Some(id),
            PathSegment::Item(context) => {
                let index = contexts.item(*context)?;
                *slot(&mut node.by_reference, index) = Some(id);
            }
            PathSegment::Wildcard => node.wildcard = Some(id),
        }
        Some(id)
    }

    /// Register `binding` at `path`, returning the node it was stored on.
    ///
    /// Returns `None` when the path runs through an item scope that has no
    /// current position.
    pub fn add_binding(
        &mut self,
        path: &[PathSegment],
        binding: BindingId,
        contexts: &Contexts,
    ) -> Option<EventNodeId> {
        let mut node = EventNodeId::ROOT;
        for segment in path {
            node = self.child(node, segment, contexts)?;
        }
        let bindings = &mut self.node_mut(node).bindings;
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
        Some(node)
    }

    pub fn remove_binding(&mut self, node: EventNodeId, binding: BindingId) {
        self.node_mut(node).bindings.retain(|id| *id != binding);
    }

    /// Track the item scope `context` of the list at `path`, so list changes
    /// keep its position current.
    pub fn add_item(
        &mut self,
        path: &[PathSegment],
        context: ContextId,
        contexts: &Contexts,
    ) -> Option<EventNodeId> {
        let mut node = EventNodeId::ROOT;
        for segment in path {
            node = self.child(node, segment, contexts)?;
        }
        self.node_mut(node).items.push(context);
        Some(node)
    }

    pub fn remove_item(&mut self, node: EventNodeId, context: ContextId) {
        self.node_mut(node).items.retain(|id| *id != context);
    }

    fn collect_subtree(&self, root: EventNodeId, out: &mut Vec<BindingId>) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.is_empty() {
                continue;
            }
            out.extend(node.bindings.iter().copied());
            let mut children: Vec<EventNodeId> = node.object.values().copied().collect();
            children.extend(node.array.iter().flatten().copied());
            children.extend(node.by_reference.iter().flatten().copied());
            children.extend(node.wildcard);
            // Reversed so that the stack visits children in insertion order.
            stack.extend(children.into_iter().rev());
        }
    }

    /// Walk to the nodes at `path`, collecting wildcard bindings passed on the way.
    fn walk(&self, path: &[Segment], out: &mut Vec<BindingId>) -> Vec<EventNodeId> {
        let mut current = vec![EventNodeId::ROOT];
        for segment in path {
            let mut next = Vec::new();
            for id in current {
                let node = self.node(id);
                if let Some(wildcard) = node.wildcard {
                    self.collect_subtree(wildcard, out);
                }
                match segment.as_index() {
                    Some(index) => {
                        next.extend(node.array.get(index).copied().flatten());
                        next.extend(node.by_reference.get(index).copied().flatten());
                    }
                    None => {
                        let key = segment.as_key().and_then(|key| node.object.get(key));
                        next.extend(key.copied());
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        current
    }

    /// Bindings affected by replacing the value at `path`.
    pub fn set(&self, path: &[Segment]) -> Vec<(BindingId, Notification)> {
        let mut updates = Vec::new();
        for node in self.walk(path, &mut updates) {
            self.collect_subtree(node, &mut updates);
        }
        finish(Vec::new(), updates)
    }

    pub fn insert(
        &mut self,
        path: &[Segment],
        index: usize,
        how_many: usize,
        contexts: &mut Contexts,
    ) -> Vec<(BindingId, Notification)> {
        self.list_change(path, ListChange::Insert { index, how_many }, contexts)
    }

    pub fn remove(
        &mut self,
        path: &[Segment],
        index: usize,
        how_many: usize,
        contexts: &mut Contexts,
    ) -> Vec<(BindingId, Notification)> {
        self.list_change(path, ListChange::Remove { index, how_many }, contexts)
    }

    pub fn move_items(
        &mut self,
        path: &[Segment],
        from: usize,
        to: usize,
        how_many: usize,
        contexts: &mut Contexts,
    ) -> Vec<(BindingId, Notification)> {
        self.list_change(path, ListChange::Move { from, to, how_many }, contexts)
    }

    /// Move item scopes and by-reference children to their new positions,
    /// then collect the bindings to notify. Positions are current before any
    /// binding runs.
    fn list_change(
        &mut self,
        path: &[Segment],
        change: ListChange,
        contexts: &mut Contexts,
    ) -> Vec<(BindingId, Notification)> {
        let mut list = Vec::new();
        let mut updates = Vec::new();
        for id in self.walk(path, &mut updates) {
            let node = self.node_mut(id);
            let slots = std::mem::take(&mut node.by_reference);
            for (index, child) in slots.into_iter().enumerate() {
                if let (Some(child), Some(index)) = (child, change.shift(index)) {
                    *slot(&mut node.by_reference, index) = Some(child);
                }
            }
            node.items.retain(|context| {
                let shifted = contexts.item(*context).and_then(|index| change.shift(index));
                contexts.set_item(*context, shifted);
                shifted.is_some()
            });

            let node = self.node(id);
            list.extend(node.bindings.iter().copied());
            let mut children: Vec<EventNodeId> = node.object.values().copied().collect();
            children.extend(
                node.array
                    .iter()
                    .skip(change.first_changed())
                    .flatten()
                    .copied(),
            );
            children.extend(node.wildcard);
            for child in children {
                self.collect_subtree(child, &mut updates);
            }
        }
        tracing::trace!(?change, list = list.len(), updates = updates.len(), "list change");
        let list = list
            .into_iter()
            .map(|id| (id, Notification::List(change)))
            .collect();
        finish(list, updates)
    }

    #[cfg(test)]
    fn bindings_at(&self, path: &[Segment]) -> Vec<BindingId> {
        let mut ignored = Vec::new();
        self.walk(path, &mut ignored)
            .into_iter()
            .flat_map(|id| self.node(id).bindings.clone())
            .collect()
    }
}

/// Structural notifications first, then updates. A binding appears once.
fn finish(
    list: Vec<(BindingId, Notification)>,
    updates: Vec<BindingId>,
) -> Vec<(BindingId, Notification)> {
    let mut seen = FxHashSet::default();
    list.into_iter()
        .chain(updates.into_iter().map(|id| (id, Notification::Update)))
        .filter(|(id, _)| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use weave_model::Path;
    use weave_templates::BlockType;
    use weave_templates::Expression;
    use weave_templates::ExpressionMeta;

    use super::*;
    use crate::contexts::ContextId;
    use crate::controller::ControllerId;

    fn id(n: u32) -> BindingId {
        BindingId::from_raw(n)
    }

    fn path(source: &str) -> Vec<PathSegment> {
        Path::parse(source)
            .segments()
            .iter()
            .map(PathSegment::from)
            .collect()
    }

    fn segments(source: &str) -> Vec<Segment> {
        Path::parse(source).into_segments()
    }

    fn ids(notifications: &[(BindingId, Notification)]) -> Vec<BindingId> {
        notifications.iter().map(|(id, _)| *id).collect()
    }

    fn item(contexts: &mut Contexts, index: usize) -> ContextId {
        let root = contexts.root(ControllerId::PAGE);
        let expression = Rc::new(Expression::path(vec!["items".into()]).with_meta(ExpressionMeta {
            block_type: Some(BlockType::Each),
            ..ExpressionMeta::default()
        }));
        contexts.each_child(root, expression, index)
    }

    mod set {
        use super::*;

        #[test]
        fn test_exact_and_descendants() {
            let contexts = Contexts::new();
            let mut events = EventModel::new();
            events.add_binding(&path("_page.user"), id(1), &contexts);
            events.add_binding(&path("_page.user.name"), id(2), &contexts);
            events.add_binding(&path("_page.other"), id(3), &contexts);

            assert_eq!(ids(&events.set(&segments("_page.user"))), vec![id(1), id(2)]);
            assert_eq!(ids(&events.set(&segments("_page.user.name"))), vec![id(2)]);
            let mut all = ids(&events.set(&segments("_page")));
            all.sort();
            assert_eq!(all, vec![id(1), id(2), id(3)]);
            assert!(events.set(&segments("_page.user.name.first")).is_empty());
        }

        #[test]
        fn test_wildcard_sees_deeper_changes() {
            let contexts = Contexts::new();
            let mut events = EventModel::new();
            let mut dependency = path("_page.nums.0");
            dependency.push(PathSegment::Wildcard);
            events.add_binding(&dependency, id(1), &contexts);

            assert_eq!(ids(&events.set(&segments("_page.nums.0"))), vec![id(1)]);
            assert_eq!(ids(&events.set(&segments("_page.nums.0.x.y"))), vec![id(1)]);
            assert_eq!(ids(&events.set(&segments("_page.nums"))), vec![id(1)]);
            assert!(events.set(&segments("_page.nums.1")).is_empty());
        }

        #[test]
        fn test_numeric_keys_share_index_slots() {
            let contexts = Contexts::new();
            let mut events = EventModel::new();
            events.add_binding(
                &[PathSegment::Key("items".into()), PathSegment::Key("1".into())],
                id(1),
                &contexts,
            );
            assert_eq!(ids(&events.set(&segments("items.1"))), vec![id(1)]);
        }

        #[test]
        fn test_removed_binding_is_not_notified() {
            let contexts = Contexts::new();
            let mut events = EventModel::new();
            let node = events.add_binding(&path("a"), id(1), &contexts).unwrap();
            events.remove_binding(node, id(1));
            assert!(events.set(&segments("a")).is_empty());
        }
    }

    mod lists {
        use super::*;

        #[test]
        fn test_insert_notifies_list_then_shifted_values() {
            let mut contexts = Contexts::new();
            let mut events = EventModel::new();
            events.add_binding(&path("items"), id(1), &contexts);
            events.add_binding(&path("items.0"), id(2), &contexts);
            events.add_binding(&path("items.2"), id(3), &contexts);
            events.add_binding(&path("items.length"), id(4), &contexts);

            let notifications = events.insert(&segments("items"), 1, 2, &mut contexts);
            assert_eq!(
                notifications,
                vec![
                    (
                        id(1),
                        Notification::List(ListChange::Insert {
                            index: 1,
                            how_many: 2
                        })
                    ),
                    (id(4), Notification::Update),
                    (id(3), Notification::Update),
                ]
            );
        }

        #[test]
        fn test_item_bindings_follow_their_item() {
            let mut contexts = Contexts::new();
            let first = item(&mut contexts, 0);
            let mut events = EventModel::new();
            let mut dependency = path("items");
            dependency.push(PathSegment::Item(first));
            events.add_binding(&dependency, id(1), &contexts);

            events.insert(&segments("items"), 0, 1, &mut contexts);
            assert!(events.bindings_at(&segments("items.0")).is_empty());
            assert_eq!(events.bindings_at(&segments("items.1")), vec![id(1)]);

            events.move_items(&segments("items"), 1, 0, 1, &mut contexts);
            assert_eq!(events.bindings_at(&segments("items.0")), vec![id(1)]);

            events.remove(&segments("items"), 0, 1, &mut contexts);
            assert!(events.bindings_at(&segments("items.0")).is_empty());
        }

        #[test]
        fn test_item_positions_shift_before_bindings_run() {
            let mut contexts = Contexts::new();
            let items: Vec<ContextId> = (0..3).map(|i| item(&mut contexts, i)).collect();
            let mut events = EventModel::new();
            for context in &items {
                events.add_item(&path("items"), *context, &contexts);
            }
            let positions = |contexts: &Contexts| -> Vec<Option<usize>> {
                items.iter().map(|context| contexts.item(*context)).collect()
            };

            events.insert(&segments("items"), 0, 1, &mut contexts);
            assert_eq!(positions(&contexts), vec![Some(1), Some(2), Some(3)]);

            events.move_items(&segments("items"), 3, 1, 1, &mut contexts);
            assert_eq!(positions(&contexts), vec![Some(2), Some(3), Some(1)]);

            events.remove(&segments("items"), 2, 1, &mut contexts);
            assert_eq!(positions(&contexts), vec![None, Some(2), Some(1)]);

            events.insert(&segments("other"), 0, 5, &mut contexts);
            assert_eq!(positions(&contexts), vec![None, Some(2), Some(1)]);
        }

        #[test]
        fn test_set_inside_item_reaches_by_reference_slot() {
            let mut contexts = Contexts::new();
            let second = item(&mut contexts, 1);
            let mut events = EventModel::new();
            let mut dependency = path("items");
            dependency.push(PathSegment::Item(second));
            dependency.push(PathSegment::Key("name".into()));
            events.add_binding(&dependency, id(7), &contexts);

            assert_eq!(ids(&events.set(&segments("items.1.name"))), vec![id(7)]);
            assert!(events.set(&segments("items.0.name")).is_empty());
        }

        #[test]
        fn test_move_updates_values_from_first_moved_index() {
            let mut contexts = Contexts::new();
            let mut events = EventModel::new();
            events.add_binding(&path("items.0"), id(1), &contexts);
            events.add_binding(&path("items.3"), id(2), &contexts);
            let notifications = events.move_items(&segments("items"), 2, 1, 1, &mut contexts);
            assert_eq!(ids(&notifications), vec![id(2)]);
        }
    }
}
