// ── Bean metadata ──
//
// The self-description every managed bean exposes. This is what drives
// "read all attributes", write-type lookup, operation signature
// resolution and the list verb's metadata tree.

use crate::value::BusType;

/// Metadata for a single attribute.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub name: String,
    pub ty: BusType,
    pub readable: bool,
    pub writable: bool,
    pub description: String,
}

impl AttributeInfo {
    /// A read-only attribute.
    pub fn readonly(name: impl Into<String>, ty: BusType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty,
            readable: true,
            writable: false,
            description: description.into(),
        }
    }

    /// A read-write attribute.
    pub fn writable(name: impl Into<String>, ty: BusType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty,
            readable: true,
            writable: true,
            description: description.into(),
        }
    }
}

/// Metadata for one operation parameter.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub ty: BusType,
}

impl ParamInfo {
    pub fn new(name: impl Into<String>, ty: BusType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Metadata for a single operation.
#[derive(Debug, Clone)]
pub struct OperationInfo {
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub ret: BusType,
    pub description: String,
}

impl OperationInfo {
    pub fn new(
        name: impl Into<String>,
        params: Vec<ParamInfo>,
        ret: BusType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            description: description.into(),
        }
    }

    /// The `name(type,type)` signature form used for explicit overload
    /// selection on the wire.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.to_string()).collect();
        format!("{}({})", self.name, params.join(","))
    }
}

/// Metadata for a notification kind a bean may emit.
#[derive(Debug, Clone)]
pub struct NotificationInfo {
    pub kind: String,
    pub description: String,
}

/// Full self-description of a managed bean.
#[derive(Debug, Clone, Default)]
pub struct BeanInfo {
    pub type_name: String,
    pub description: String,
    pub attributes: Vec<AttributeInfo>,
    pub operations: Vec<OperationInfo>,
    pub notifications: Vec<NotificationInfo>,
}

impl BeanInfo {
    pub fn new(type_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<AttributeInfo>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_operations(mut self, operations: Vec<OperationInfo>) -> Self {
        self.operations = operations;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Names of all readable attributes, in declaration order.
    pub fn readable_attributes(&self) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|a| a.readable)
            .map(|a| a.name.clone())
            .collect()
    }

    /// Resolve an operation by plain name and arity, or by its
    /// explicit `name(type,type)` signature form.
    ///
    /// Returns `None` when nothing matches; `Some(Err(..))` style
    /// ambiguity is left to the caller by returning all candidates.
    pub fn operations_named(&self, name: &str, arity: usize) -> Vec<&OperationInfo> {
        if name.contains('(') {
            return self
                .operations
                .iter()
                .filter(|op| op.signature() == name)
                .collect();
        }
        self.operations
            .iter()
            .filter(|op| op.name == name && op.params.len() == arity)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> BeanInfo {
        BeanInfo::new("Collector", "test bean").with_operations(vec![
            OperationInfo::new("gc", vec![], BusType::Any, "run a collection"),
            OperationInfo::new(
                "resize",
                vec![ParamInfo::new("limit", BusType::Int)],
                BusType::Int,
                "resize by count",
            ),
            OperationInfo::new(
                "resize",
                vec![ParamInfo::new("factor", BusType::Float)],
                BusType::Int,
                "resize by factor",
            ),
        ])
    }

    #[test]
    fn resolve_by_name_and_arity() {
        let info = info();
        assert_eq!(info.operations_named("gc", 0).len(), 1);
        assert!(info.operations_named("gc", 1).is_empty());
        // Overloaded at the same arity: both come back.
        assert_eq!(info.operations_named("resize", 1).len(), 2);
    }

    #[test]
    fn resolve_by_explicit_signature() {
        let info = info();
        let found = info.operations_named("resize(float)", 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].params[0].name, "factor");
    }
}
