//! Reflection over validated naga modules.
//!
//! The binding layer only needs two facts from a compiled stage: which named
//! vertex inputs live at which location, and the layout of the uniform block
//! bound at `@group(0) @binding(0)`.

use naga::{AddressSpace, Binding, EntryPoint, Module, ScalarKind, TypeInner, VectorSize};
use serde::{Deserialize, Serialize};

/// Group and binding index the uniform block must use.
pub const UNIFORM_GROUP: u32 = 0;
pub const UNIFORM_BINDING: u32 = 0;

/// Shape of a uniform block member as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformKind {
    Int,
    Float,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    /// Anything the setters cannot write (arrays, nested structs, ...).
    Other,
}

/// A named member of the uniform block and its byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub kind: UniformKind,
}

/// Reflected layout of the uniform block shared by every stage of a program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformBlock {
    pub size: u32,
    pub members: Vec<UniformMember>,
}

impl UniformBlock {
    pub fn member(&self, name: &str) -> Option<&UniformMember> {
        self.members.iter().find(|member| member.name == name)
    }
}

/// Returns the `(name, location)` pairs consumed by a vertex entry point.
///
/// Both plain `@location` arguments and members of a struct argument are
/// reported; builtins are skipped.
pub fn vertex_inputs(module: &Module, entry: &EntryPoint) -> Vec<(String, u32)> {
    let mut inputs = Vec::new();
    for argument in &entry.function.arguments {
        match (&argument.binding, &module.types[argument.ty].inner) {
            (Some(Binding::Location { location, .. }), _) => {
                if let Some(name) = &argument.name {
                    inputs.push((name.clone(), *location));
                }
            }
            (None, TypeInner::Struct { members, .. }) => {
                for member in members {
                    if let (Some(name), Some(Binding::Location { location, .. })) =
                        (&member.name, &member.binding)
                    {
                        inputs.push((name.clone(), *location));
                    }
                }
            }
            _ => {}
        }
    }
    inputs
}

/// Finds the uniform block bound at group 0, binding 0, if the module has one.
pub fn uniform_block(module: &Module) -> Option<UniformBlock> {
    module.global_variables.iter().find_map(|(_, variable)| {
        let binding = variable.binding.as_ref()?;
        if variable.space != AddressSpace::Uniform
            || binding.group != UNIFORM_GROUP
            || binding.binding != UNIFORM_BINDING
        {
            return None;
        }
        match &module.types[variable.ty].inner {
            TypeInner::Struct { members, span } => Some(UniformBlock {
                size: *span,
                members: members
                    .iter()
                    .filter_map(|member| {
                        Some(UniformMember {
                            name: member.name.clone()?,
                            offset: member.offset,
                            kind: uniform_kind(&module.types[member.ty].inner),
                        })
                    })
                    .collect(),
            }),
            _ => None,
        }
    })
}

fn uniform_kind(inner: &TypeInner) -> UniformKind {
    match *inner {
        TypeInner::Scalar(scalar) => match scalar.kind {
            ScalarKind::Sint | ScalarKind::Uint => UniformKind::Int,
            ScalarKind::Float => UniformKind::Float,
            _ => UniformKind::Other,
        },
        TypeInner::Vector {
            size: VectorSize::Tri,
            scalar,
        } if scalar.kind == ScalarKind::Float => UniformKind::Vec3,
        TypeInner::Vector {
            size: VectorSize::Quad,
            scalar,
        } if scalar.kind == ScalarKind::Float => UniformKind::Vec4,
        TypeInner::Matrix {
            columns: VectorSize::Tri,
            rows: VectorSize::Tri,
            ..
        } => UniformKind::Mat3,
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            ..
        } => UniformKind::Mat4,
        _ => UniformKind::Other,
    }
}
