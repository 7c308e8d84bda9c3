//! Scope-gated resource rendering
//!
//! String scalars are rendered only inside an enabled scope. A resource is
//! enabled as a whole by the `kpt.seek.com/render-template: "true"`
//! annotation; a mapping enables itself and its descendants with a
//! `$kpt-template: "true"` marker. Scope only strengthens: nothing below an
//! enabled node can disable it again.
//!
//! Delimiters come from the `kpt.seek.com/render-template/delimiters`
//! annotation and can be replaced for a subtree with a
//! `$kpt-template-delimiters` marker. The delimiters annotation itself is
//! never rendered.

use clusterpack_core::annotations::{RENDER_TEMPLATE_ENABLED, seek};
use clusterpack_core::{Mapping, Node, Resource, is_kptfile};
use tracing::Span;

use crate::context::TemplateContext;
use crate::error::{EngineError, Result};
use crate::interpreter::Interpreter;
use crate::lexer::Delimiters;

/// Scope in effect at a point of the walk
#[derive(Debug, Clone)]
struct Scope {
    enabled: bool,
    delimiters: Delimiters,
}

impl Scope {
    /// Apply a mapping's markers
    fn refine(&self, mapping: &Mapping) -> Result<Scope> {
        let markers = mapping.markers();
        let delimiters = match &markers.delimiters {
            Some(value) => Delimiters::parse(value)?,
            None => self.delimiters.clone(),
        };
        Ok(Scope {
            enabled: self.enabled || markers.template,
            delimiters,
        })
    }
}

/// Renders templated fields of resources against one context
pub struct Renderer {
    context: TemplateContext,
    span: Span,
}

impl Renderer {
    pub fn new(context: TemplateContext) -> Self {
        Self {
            context,
            span: Span::current(),
        }
    }

    /// Log under the given parent span instead of the caller's current span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn context(&self) -> &TemplateContext {
        &self.context
    }

    /// Render every resource except package manifests
    pub fn render_all(&self, resources: &mut [Resource]) -> Result<()> {
        let _guard = self.span.enter();
        for resource in resources.iter_mut().filter(|r| !is_kptfile(r)) {
            self.render_resource(resource)?;
        }
        Ok(())
    }

    /// Render one resource in place
    pub fn render_resource(&self, resource: &mut Resource) -> Result<()> {
        let enabled = resource
            .annotation(seek::RENDER_TEMPLATE)
            .is_some_and(|v| v == RENDER_TEMPLATE_ENABLED);
        let delimiters = match resource.annotation(seek::RENDER_TEMPLATE_DELIMITERS) {
            Some(value) => Delimiters::parse(&value)?,
            None => Delimiters::default(),
        };

        let id = resource.id().to_string();
        let mut path = Vec::new();
        let mut rendered = 0usize;
        let mut walk = Walk {
            context: &self.context,
            resource: &id,
            path: &mut path,
            rendered: &mut rendered,
        };
        walk.mapping(resource.body_mut(), &Scope { enabled, delimiters })?;

        if rendered > 0 {
            tracing::debug!(resource = %id, fields = rendered, "rendered templated fields");
        }
        Ok(())
    }
}

struct Walk<'w> {
    context: &'w TemplateContext,
    resource: &'w str,
    path: &'w mut Vec<String>,
    rendered: &'w mut usize,
}

impl Walk<'_> {
    fn mapping(&mut self, mapping: &mut Mapping, scope: &Scope) -> Result<()> {
        let scope = scope.refine(mapping)?;
        for (key, value) in mapping.fields_mut() {
            if key == seek::RENDER_TEMPLATE_DELIMITERS {
                continue;
            }
            self.path.push(key.clone());
            let result = self.node(value, &scope);
            self.path.pop();
            result?;
        }
        Ok(())
    }

    fn node(&mut self, node: &mut Node, scope: &Scope) -> Result<()> {
        match node {
            Node::Mapping(mapping) => self.mapping(mapping, scope),
            Node::Sequence(items) => {
                for (i, item) in items.iter_mut().enumerate() {
                    self.path.push(format!("[{}]", i));
                    let result = self.node(item, scope);
                    self.path.pop();
                    result?;
                }
                Ok(())
            }
            Node::Tagged(tagged) => self.node(&mut tagged.value, scope),
            Node::String(text) if scope.enabled => {
                let output = Interpreter::new(self.context, &scope.delimiters)
                    .render(text)
                    .map_err(|cause| EngineError::Render {
                        resource: self.resource.to_string(),
                        field: self.field(),
                        cause: Box::new(cause),
                    })?;
                *text = output;
                *self.rendered += 1;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn field(&self) -> String {
        let mut field = String::new();
        for segment in self.path.iter() {
            if !field.is_empty() && !segment.starts_with('[') {
                field.push('.');
            }
            field.push_str(segment);
        }
        field
    }
}
