//! Places an instance's wrapper element into its container.
//!
//! # Invariants
//! - Rendering the element already held by the container mutates nothing.
//! - A missing container is an error in every phase except `Unmounted`.

use crate::dom::{Document, Element};
use crate::error::{LifecycleError, LifecycleResult};
use crate::model::app::{ContainerRef, LegacyRender, LegacyRenderProps};
use log::debug;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Loading,
    Mounting,
    Mounted,
    Unmounted,
}

impl RenderPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Mounting => "mounting",
            Self::Mounted => "mounted",
            Self::Unmounted => "unmounted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderProps {
    /// `None` empties the container.
    pub element: Option<Rc<Element>>,
    pub loading: bool,
    pub container: Option<ContainerRef>,
}

/// Render adapter bound to one app instance.
#[derive(Clone)]
pub struct Renderer {
    document: Rc<Document>,
    instance_id: String,
    legacy: Option<LegacyRender>,
}

impl Renderer {
    pub fn new(document: Rc<Document>, instance_id: &str, legacy: Option<LegacyRender>) -> Self {
        Self {
            document,
            instance_id: instance_id.to_string(),
            legacy,
        }
    }

    pub fn render(&self, props: &RenderProps, phase: RenderPhase) -> LifecycleResult<()> {
        if let Some(legacy) = &self.legacy {
            let markup = props
                .element
                .as_ref()
                .map(|element| element.outer_html())
                .unwrap_or_default();
            legacy(LegacyRenderProps {
                loading: props.loading,
                markup,
            });
            return Ok(());
        }

        let container = props
            .container
            .as_ref()
            .and_then(|container| self.document.resolve_container(container));
        let Some(container) = container else {
            if phase == RenderPhase::Unmounted {
                return Ok(());
            }
            return Err(LifecycleError::ContainerNotFound {
                container: props
                    .container
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "<none>".to_string()),
                instance_id: self.instance_id.clone(),
                phase,
            });
        };

        let held = props
            .element
            .as_ref()
            .is_some_and(|element| container.contains(element));
        if !held {
            let removed = container.remove_all_children();
            if let Some(element) = &props.element {
                container.append_child(element.clone());
            }
            debug!(
                "event=render module=lifecycle status=ok instance_id={} phase={} removed={removed}",
                self.instance_id,
                phase.as_str()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{RenderPhase, RenderProps, Renderer};
    use crate::dom::{Document, Element};
    use crate::error::LifecycleError;
    use crate::model::app::{ContainerRef, LegacyRenderProps};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn document_with_root() -> (Rc<Document>, Rc<Element>) {
        let document = Rc::new(Document::new());
        let root = Element::new("div");
        root.set_attribute("id", "root");
        document.body().append_child(root.clone());
        (document, root)
    }

    #[test]
    fn second_identical_render_is_noop() {
        let (document, root) = document_with_root();
        root.append_text("placeholder");
        let renderer = Renderer::new(document, "orders", None);
        let props = RenderProps {
            element: Some(Element::new("section")),
            loading: false,
            container: Some(ContainerRef::from("#root")),
        };

        renderer
            .render(&props, RenderPhase::Mounting)
            .expect("first render");
        let after_first = root.mutation_count();
        renderer
            .render(&props, RenderPhase::Mounted)
            .expect("second render");
        assert_eq!(root.mutation_count(), after_first);
        assert_eq!(root.child_count(), 1);
    }

    #[test]
    fn missing_container_fails_outside_unmounted() {
        let (document, _) = document_with_root();
        let renderer = Renderer::new(document, "orders", None);
        let props = RenderProps {
            element: None,
            loading: false,
            container: Some(ContainerRef::from("#absent")),
        };

        let err = renderer
            .render(&props, RenderPhase::Loading)
            .expect_err("container is absent");
        assert!(matches!(
            err,
            LifecycleError::ContainerNotFound {
                phase: RenderPhase::Loading,
                ..
            }
        ));
        renderer
            .render(&props, RenderPhase::Unmounted)
            .expect("unmounted tolerates missing container");
    }

    #[test]
    fn legacy_render_receives_markup() {
        let (document, root) = document_with_root();
        let calls = Rc::new(RefCell::new(Vec::<LegacyRenderProps>::new()));
        let seen = calls.clone();
        let renderer = Renderer::new(
            document,
            "orders",
            Some(Rc::new(move |props: LegacyRenderProps| {
                seen.borrow_mut().push(props)
            })),
        );
        let element = Element::new("div");
        renderer
            .render(
                &RenderProps {
                    element: Some(element),
                    loading: true,
                    container: None,
                },
                RenderPhase::Loading,
            )
            .expect("legacy render");

        assert_eq!(root.child_count(), 0);
        assert_eq!(
            calls.borrow()[0],
            LegacyRenderProps {
                loading: true,
                markup: "<div></div>".to_string(),
            }
        );
    }
}
