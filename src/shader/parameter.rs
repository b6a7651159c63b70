use crate::error::{CompositorError, Result};

/// The fixed set of parameters the split program declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderParameter {
    /// 2D vertex position of the unit quad
    Position,
    /// Model-view-projection matrix
    Matrix,
    /// Texture-coordinate transform reported by the decoder
    TextureMatrix,
    /// Video frame texture
    TextureSampler,
}

/// Whether a parameter is fed per vertex or per draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Attribute,
    Uniform,
}

impl ShaderParameter {
    pub const ALL: [ShaderParameter; 4] = [
        ShaderParameter::Position,
        ShaderParameter::Matrix,
        ShaderParameter::TextureMatrix,
        ShaderParameter::TextureSampler,
    ];

    /// Identifier used in the WGSL sources
    pub const fn name(self) -> &'static str {
        match self {
            ShaderParameter::Position => "a_position",
            ShaderParameter::Matrix => "u_matrix",
            ShaderParameter::TextureMatrix => "u_texture_matrix",
            ShaderParameter::TextureSampler => "u_texture_sampler",
        }
    }

    pub const fn kind(self) -> ParameterKind {
        match self {
            ShaderParameter::Position => ParameterKind::Attribute,
            _ => ParameterKind::Uniform,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|param| param.name() == name)
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

/// Location of a resolved parameter inside a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterHandle {
    /// Vertex input `@location`
    Attribute { location: u32 },
    /// Resource `@group` / `@binding`
    Uniform { group: u32, binding: u32 },
}

impl ParameterHandle {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterHandle::Attribute { .. } => ParameterKind::Attribute,
            ParameterHandle::Uniform { .. } => ParameterKind::Uniform,
        }
    }
}

/// Handles resolved once at build time, indexed by parameter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterTable {
    handles: [Option<ParameterHandle>; 4],
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, param: ShaderParameter, handle: ParameterHandle) {
        self.handles[param.slot()] = Some(handle);
    }

    pub fn contains(&self, param: ShaderParameter) -> bool {
        self.handles[param.slot()].is_some()
    }

    /// Handle for a declared parameter
    pub fn get(&self, param: ShaderParameter) -> Result<ParameterHandle> {
        self.handles[param.slot()]
            .ok_or_else(|| CompositorError::UnknownParameter(param.name().to_string()))
    }

    /// Handle looked up by WGSL identifier
    pub fn get_by_name(&self, name: &str) -> Result<ParameterHandle> {
        ShaderParameter::from_name(name)
            .and_then(|param| self.handles[param.slot()])
            .ok_or_else(|| CompositorError::UnknownParameter(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShaderParameter, ParameterHandle)> + '_ {
        ShaderParameter::ALL
            .into_iter()
            .filter_map(|param| self.handles[param.slot()].map(|handle| (param, handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for param in ShaderParameter::ALL {
            assert_eq!(ShaderParameter::from_name(param.name()), Some(param));
        }
        assert_eq!(ShaderParameter::from_name("uMatrix"), None);
    }

    #[test]
    fn test_only_position_is_attribute() {
        assert_eq!(ShaderParameter::Position.kind(), ParameterKind::Attribute);
        assert_eq!(ShaderParameter::Matrix.kind(), ParameterKind::Uniform);
        assert_eq!(ShaderParameter::TextureMatrix.kind(), ParameterKind::Uniform);
        assert_eq!(ShaderParameter::TextureSampler.kind(), ParameterKind::Uniform);
    }

    #[test]
    fn test_undeclared_parameter_is_unknown() {
        let mut table = ParameterTable::new();
        table.insert(ShaderParameter::Position, ParameterHandle::Attribute { location: 0 });

        assert_eq!(
            table.get(ShaderParameter::Position).ok(),
            Some(ParameterHandle::Attribute { location: 0 })
        );
        assert!(matches!(
            table.get(ShaderParameter::Matrix),
            Err(CompositorError::UnknownParameter(name)) if name == "u_matrix"
        ));
    }

    #[test]
    fn test_lookup_by_name() {
        let mut table = ParameterTable::new();
        let handle = ParameterHandle::Uniform { group: 0, binding: 1 };
        table.insert(ShaderParameter::TextureMatrix, handle);

        assert_eq!(table.get_by_name("u_texture_matrix").ok(), Some(handle));
        assert!(matches!(
            table.get_by_name("u_color"),
            Err(CompositorError::UnknownParameter(name)) if name == "u_color"
        ));
    }

    #[test]
    fn test_iter_yields_declared_only() {
        let mut table = ParameterTable::new();
        table.insert(ShaderParameter::Matrix, ParameterHandle::Uniform { group: 0, binding: 0 });
        let declared: Vec<_> = table.iter().map(|(param, _)| param).collect();
        assert_eq!(declared, vec![ShaderParameter::Matrix]);
    }
}
