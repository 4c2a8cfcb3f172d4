use weave_dom::NodeId;
use weave_model::Path;
use weave_templates::ViewAttribute;
use weave_templates::ViewInstance;

use crate::bindings::BindingKind;
use crate::contexts::ContextId;
use crate::contexts::ViewScope;
use crate::error::ViewError;
use crate::page::Page;
use crate::page::Task;
use crate::views::View;

impl Page {
    pub(crate) fn find_view(&self, name: &str) -> Result<View, ViewError> {
        self.app
            .views()
            .find(name)
            .ok_or_else(|| ViewError::UnknownView(name.to_string()))
    }

    /// Create the scope a view instance renders in, creating its controller
    /// when the view has a component.
    ///
    /// `anchor` is the node that owns the component in the DOM; without one
    /// the instance is rendered to a string and nothing is bound or queued.
    pub(crate) fn instantiate(
        &mut self,
        view: &View,
        instance: &ViewInstance,
        context: ContextId,
        anchor: Option<NodeId>,
    ) -> Result<ContextId, ViewError> {
        let scope = ViewScope {
            name: instance.name.clone(),
            attributes: instance.attributes.clone(),
        };
        let parent = self.contexts.get(context).controller;
        let Some(factory) = &view.component else {
            return Ok(self.contexts.view_child(context, parent, scope));
        };

        let settings = self.app.settings();
        let id = format!("{}_{}", settings.id_namespace, self.meta.next_id());
        let model_scope = Path::root()
            .child(settings.components_path.as_str())
            .child(id.as_str());
        let controller =
            self.controllers
                .add(id.clone(), model_scope.clone(), parent, &instance.name, factory());
        tracing::debug!(view = instance.name.as_str(), component = id.as_str(), "created component");

        for (key, attribute) in &instance.attributes {
            match attribute {
                ViewAttribute::Literal(value) => {
                    self.model.set(&model_scope.child(key.as_str()), value.clone())?;
                }
                ViewAttribute::Expression(expression) => {
                    if let Some(target) = self.evaluator().resolve(expression, context) {
                        self.controllers
                            .get_mut(controller)
                            .refs
                            .push((key.clone(), target));
                        continue;
                    }
                    let value = self.evaluator().get(expression, context)?.into_json();
                    self.model.set(&model_scope.child(key.as_str()), value)?;
                    if let Some(anchor) = anchor {
                        if self.should_bind(context, expression) {
                            let dependencies = self.evaluator().dependencies(expression, context);
                            let kind = BindingKind::ComponentAttribute {
                                controller,
                                key: key.clone(),
                                expression: expression.clone(),
                            };
                            self.bind(kind, context, anchor, dependencies);
                        }
                    }
                }
                // Rendered lazily through the view scope.
                ViewAttribute::Template(_) => {}
            }
        }

        let view_context = self.contexts.view_child(context, controller, scope);
        self.with_component(controller, |component, page| {
            component.init(page, controller)
        })?;
        if let Some(anchor) = anchor {
            self.meta.queue(Task::Create(controller));
            self.node_meta(anchor).destroy.push(Task::Destroy(controller));
        }
        Ok(view_context)
    }
}
