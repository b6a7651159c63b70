//! WGSL compilation and interface reflection.
//!
//! Both stages are parsed and validated with naga, then linked: fragment inputs
//! must be written by the vertex stage and resources shared by the two stages must
//! agree on their slot. The resulting [`ProgramInterface`] is what declared
//! parameters resolve against and what backends build their pipeline layouts from.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{
    AddressSpace, Binding, Handle, ImageClass, ImageDimension, Module, ScalarKind, Type,
    TypeInner, VectorSize,
};

use super::parameter::{ParameterHandle, ShaderParameter};
use crate::error::{CompositorError, Result, ShaderStage};

/// Value type of a vertex input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Other,
}

impl InputFormat {
    /// Size of one element in bytes, when known
    pub fn size(self) -> Option<u32> {
        match self {
            InputFormat::Float32 => Some(4),
            InputFormat::Float32x2 => Some(8),
            InputFormat::Float32x3 => Some(12),
            InputFormat::Float32x4 => Some(16),
            InputFormat::Other => None,
        }
    }
}

/// Resource category of a bound global
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// `var<uniform> name: mat4x4<f32>`
    Matrix4,
    /// `texture_2d<f32>`
    Texture2d,
    /// Filtering `sampler`
    Sampler,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInput {
    pub name: String,
    pub location: u32,
    pub format: InputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderResource {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
    pub vertex: bool,
    pub fragment: bool,
}

/// Linked interface of a vertex + fragment pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInterface {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub vertex_inputs: Vec<VertexInput>,
    /// Sorted by group, then binding
    pub resources: Vec<ShaderResource>,
}

#[derive(Debug, Clone)]
struct Location {
    name: Option<String>,
    location: u32,
    format: InputFormat,
}

#[derive(Debug)]
struct StageInterface {
    entry_point: String,
    inputs: Vec<Location>,
    outputs: Vec<Location>,
    resources: Vec<(String, u32, u32, ResourceKind)>,
}

impl ProgramInterface {
    /// Compile both stages and link them into one interface
    pub fn link(vertex_source: &str, fragment_source: &str) -> Result<Self> {
        let vertex = reflect_stage(vertex_source, ShaderStage::Vertex)?;
        let fragment = reflect_stage(fragment_source, ShaderStage::Fragment)?;

        for input in &fragment.inputs {
            if !vertex.outputs.iter().any(|out| out.location == input.location) {
                return Err(link_error(format!(
                    "fragment input @location({}) is not written by the vertex stage",
                    input.location
                )));
            }
        }

        let mut resources: Vec<ShaderResource> = Vec::new();
        for (stage, declared) in [
            (ShaderStage::Vertex, &vertex.resources),
            (ShaderStage::Fragment, &fragment.resources),
        ] {
            for (name, group, binding, kind) in declared {
                let index = match resources
                    .iter()
                    .position(|r| r.group == *group && r.binding == *binding)
                {
                    Some(index) => {
                        let existing = &resources[index];
                        if existing.name != *name || existing.kind != *kind {
                            return Err(link_error(format!(
                                "@group({group}) @binding({binding}) is `{}` in one stage and `{name}` in the other",
                                existing.name
                            )));
                        }
                        index
                    }
                    None => {
                        resources.push(ShaderResource {
                            name: name.clone(),
                            group: *group,
                            binding: *binding,
                            kind: *kind,
                            vertex: false,
                            fragment: false,
                        });
                        resources.len() - 1
                    }
                };
                let resource = &mut resources[index];
                match stage {
                    ShaderStage::Vertex => resource.vertex = true,
                    _ => resource.fragment = true,
                }
            }
        }
        resources.sort_by_key(|r| (r.group, r.binding));

        let vertex_inputs = vertex
            .inputs
            .into_iter()
            .filter_map(|input| {
                input.name.map(|name| VertexInput {
                    name,
                    location: input.location,
                    format: input.format,
                })
            })
            .collect();

        Ok(Self {
            vertex_entry: vertex.entry_point,
            fragment_entry: fragment.entry_point,
            vertex_inputs,
            resources,
        })
    }

    pub fn vertex_input(&self, name: &str) -> Option<&VertexInput> {
        self.vertex_inputs.iter().find(|input| input.name == name)
    }

    pub fn resource(&self, name: &str) -> Option<&ShaderResource> {
        self.resources.iter().find(|resource| resource.name == name)
    }

    /// Resolve a declared parameter to its handle in this program
    pub fn resolve(&self, param: ShaderParameter) -> Result<ParameterHandle> {
        let name = param.name();
        let missing = |expected: &'static str| CompositorError::ParameterResolution { name, expected };

        match param {
            ShaderParameter::Position => self
                .vertex_input(name)
                .filter(|input| input.format == InputFormat::Float32x2)
                .map(|input| ParameterHandle::Attribute {
                    location: input.location,
                })
                .ok_or_else(|| missing("a vec2<f32> vertex input")),
            ShaderParameter::Matrix | ShaderParameter::TextureMatrix => {
                self.resolve_resource(name, ResourceKind::Matrix4)
                    .ok_or_else(|| missing("a mat4x4<f32> uniform"))
            }
            ShaderParameter::TextureSampler => self
                .resolve_resource(name, ResourceKind::Texture2d)
                .ok_or_else(|| missing("a texture_2d<f32>")),
        }
    }

    fn resolve_resource(&self, name: &str, kind: ResourceKind) -> Option<ParameterHandle> {
        self.resource(name)
            .filter(|resource| resource.kind == kind)
            .map(|resource| ParameterHandle::Uniform {
                group: resource.group,
                binding: resource.binding,
            })
    }
}

fn compile_error(stage: ShaderStage, message: String) -> CompositorError {
    CompositorError::ShaderCompile { stage, message }
}

fn link_error(message: String) -> CompositorError {
    compile_error(ShaderStage::Link, message)
}

fn reflect_stage(source: &str, stage: ShaderStage) -> Result<StageInterface> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| compile_error(stage, err.emit_to_string(source)))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|err| compile_error(stage, err.emit_to_string(source)))?;

    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        _ => naga::ShaderStage::Fragment,
    };
    let entry = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == naga_stage)
        .ok_or_else(|| compile_error(stage, format!("no @{stage} entry point")))?;

    let mut inputs = Vec::new();
    for argument in &entry.function.arguments {
        collect_locations(
            &module,
            argument.name.as_deref(),
            argument.ty,
            argument.binding.as_ref(),
            &mut inputs,
        );
    }

    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(&module, None, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let resources = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            let name = var.name.clone()?;
            let kind = resource_kind(&module.types[var.ty].inner, var.space);
            Some((name, binding.group, binding.binding, kind))
        })
        .collect();

    Ok(StageInterface {
        entry_point: entry.name.clone(),
        inputs,
        outputs,
        resources,
    })
}

/// Gather `@location` bindings, descending into struct members
fn collect_locations(
    module: &Module,
    name: Option<&str>,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<Location>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(Location {
            name: name.map(str::to_string),
            location: *location,
            format: input_format(&module.types[ty].inner),
        }),
        Some(_) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(
                        module,
                        member.name.as_deref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn is_f32(scalar: naga::Scalar) -> bool {
    scalar.kind == ScalarKind::Float && scalar.width == 4
}

fn input_format(inner: &TypeInner) -> InputFormat {
    match *inner {
        TypeInner::Scalar(scalar) if is_f32(scalar) => InputFormat::Float32,
        TypeInner::Vector { size, scalar } if is_f32(scalar) => match size {
            VectorSize::Bi => InputFormat::Float32x2,
            VectorSize::Tri => InputFormat::Float32x3,
            VectorSize::Quad => InputFormat::Float32x4,
        },
        _ => InputFormat::Other,
    }
}

fn resource_kind(inner: &TypeInner, space: AddressSpace) -> ResourceKind {
    match *inner {
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if space == AddressSpace::Uniform && is_f32(scalar) => ResourceKind::Matrix4,
        TypeInner::Image {
            dim: ImageDimension::D2,
            arrayed: false,
            class: ImageClass::Sampled {
                kind: ScalarKind::Float,
                multi: false,
            },
        } => ResourceKind::Texture2d,
        TypeInner::Sampler { comparison: false } => ResourceKind::Sampler,
        _ => ResourceKind::Other,
    }
}
