//! # Program Construction
//!
//! Ordered, checked construction of the quad program:
//!
//! ```text
//! ProgramBuilder ──vertex_shader()──┐
//!                ──fragment_shader()┴──► link() ──► LinkedProgram
//!                   (parse + validate)     (interface check,
//!                                           binding resolution)
//! ```
//!
//! Everything here runs on the CPU with `naga`, so a broken shader is
//! reported before a device is touched. Uniform and attribute names are
//! resolved once, during `link`, into fixed tables; lookups on a
//! [`LinkedProgram`] cannot fail.

use std::collections::BTreeMap;
use std::fmt;

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::error::PipelineError;

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
}

impl ShaderStage {
    const fn naga(self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        })
    }
}

/// Uniforms the quad program must declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniform {
    /// Drawable size in pixels, `vec2<f32>`.
    Resolution,
    /// Frame texture.
    Texture,
    /// Frame sampler.
    Sampler,
}

impl Uniform {
    /// All uniforms, in table order.
    pub const ALL: [Self; 3] = [Self::Resolution, Self::Texture, Self::Sampler];

    /// Declared name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Resolution => "u_resolution",
            Self::Texture => "u_texture",
            Self::Sampler => "u_sampler",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Per-vertex inputs the quad program must declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Pixel-space position, `vec2<f32>`.
    Position,
    /// Texture coordinate, `vec2<f32>`.
    TexCoord,
}

impl Attribute {
    /// All attributes, in table order.
    pub const ALL: [Self; 2] = [Self::Position, Self::TexCoord];

    /// Declared name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Position => "a_position",
            Self::TexCoord => "a_tex_coord",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Resolved `@group/@binding` of a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UniformBinding {
    /// Bind group index.
    pub group: u32,
    /// Binding index within the group.
    pub binding: u32,
}

/// A parsed and validated shader stage.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    stage: ShaderStage,
    source: String,
    entry_point: String,
    module: naga::Module,
}

impl CompiledShader {
    /// Parses and validates `source`, which must contain an entry point for
    /// `stage`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Compile`] with the rendered diagnostic.
    pub fn compile(stage: ShaderStage, source: &str) -> Result<Self, PipelineError> {
        let fail = |diagnostic: String| {
            tracing::error!(%stage, "shader compilation failed:\n{diagnostic}");
            PipelineError::Compile { stage, diagnostic }
        };

        let module = naga::front::wgsl::parse_str(source).map_err(|err| fail(err.emit_to_string(source)))?;
        Validator::new(ValidationFlags::all(), Capabilities::empty())
            .validate(&module)
            .map_err(|err| fail(err.emit_to_string(source)))?;

        let entry_point = module
            .entry_points
            .iter()
            .find(|ep| ep.stage == stage.naga())
            .map(|ep| ep.name.clone())
            .ok_or_else(|| fail(format!("no @{stage} entry point")))?;

        tracing::debug!(%stage, entry_point, "shader compiled");
        Ok(Self {
            stage,
            source: source.to_owned(),
            entry_point,
            module,
        })
    }

    /// Stage this shader was compiled for.
    #[must_use]
    pub const fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// WGSL source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Name of the stage's entry point.
    #[must_use]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn entry(&self) -> Option<&naga::EntryPoint> {
        self.module.entry_points.iter().find(|ep| ep.name == self.entry_point)
    }

    /// `(name, location)` of every entry-point input, struct members
    /// flattened.
    fn inputs(&self) -> Vec<(Option<String>, u32)> {
        let mut out = Vec::new();
        if let Some(entry) = self.entry() {
            for arg in &entry.function.arguments {
                self.collect_locations(arg.name.as_deref(), arg.binding.as_ref(), arg.ty, &mut out);
            }
        }
        out
    }

    /// `(name, location)` of every entry-point output.
    fn outputs(&self) -> Vec<(Option<String>, u32)> {
        let mut out = Vec::new();
        if let Some(result) = self.entry().and_then(|entry| entry.function.result.as_ref()) {
            self.collect_locations(None, result.binding.as_ref(), result.ty, &mut out);
        }
        out
    }

    fn collect_locations(
        &self,
        name: Option<&str>,
        binding: Option<&naga::Binding>,
        ty: naga::Handle<naga::Type>,
        out: &mut Vec<(Option<String>, u32)>,
    ) {
        match binding {
            Some(naga::Binding::Location { location, .. }) => out.push((name.map(str::to_owned), *location)),
            Some(naga::Binding::BuiltIn(_)) => {}
            None => {
                if let naga::TypeInner::Struct { members, .. } = &self.module.types[ty].inner {
                    for member in members {
                        self.collect_locations(member.name.as_deref(), member.binding.as_ref(), member.ty, out);
                    }
                }
            }
        }
    }

    fn global(&self, name: &str) -> Option<UniformBinding> {
        self.module
            .global_variables
            .iter()
            .find(|(_, var)| var.name.as_deref() == Some(name))
            .and_then(|(_, var)| var.binding.as_ref())
            .map(|rb| UniformBinding {
                group: rb.group,
                binding: rb.binding,
            })
    }
}

/// Collects the two stages of the quad program.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    vertex: Option<CompiledShader>,
    fragment: Option<CompiledShader>,
}

impl ProgramBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles the vertex stage.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Compile`].
    pub fn vertex_shader(mut self, source: &str) -> Result<Self, PipelineError> {
        self.vertex = Some(CompiledShader::compile(ShaderStage::Vertex, source)?);
        Ok(self)
    }

    /// Compiles the fragment stage.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Compile`].
    pub fn fragment_shader(mut self, source: &str) -> Result<Self, PipelineError> {
        self.fragment = Some(CompiledShader::compile(ShaderStage::Fragment, source)?);
        Ok(self)
    }

    /// Checks the stage interface and resolves every [`Uniform`] and
    /// [`Attribute`].
    ///
    /// # Errors
    ///
    /// [`PipelineError::MissingShader`] if a stage was never compiled,
    /// [`PipelineError::Link`] if the fragment stage reads a location the
    /// vertex stage does not write or a uniform is bound inconsistently, and
    /// [`PipelineError::UnknownUniform`] / [`PipelineError::UnknownAttribute`]
    /// for undeclared names.
    pub fn link(self) -> Result<LinkedProgram, PipelineError> {
        let vertex = self.vertex.ok_or(PipelineError::MissingShader(ShaderStage::Vertex))?;
        let fragment = self.fragment.ok_or(PipelineError::MissingShader(ShaderStage::Fragment))?;

        let produced: BTreeMap<u32, Option<String>> =
            vertex.outputs().into_iter().map(|(name, loc)| (loc, name)).collect();
        for (name, location) in fragment.inputs() {
            if !produced.contains_key(&location) {
                let diagnostic = format!(
                    "fragment input `{}` at @location({location}) is not written by the vertex stage",
                    name.as_deref().unwrap_or("<unnamed>")
                );
                tracing::error!("{diagnostic}");
                return Err(PipelineError::Link { diagnostic });
            }
        }

        let mut uniforms = [UniformBinding::default(); 3];
        for uniform in Uniform::ALL {
            let name = uniform.name();
            uniforms[uniform.index()] = match (vertex.global(name), fragment.global(name)) {
                (Some(a), Some(b)) if a != b => {
                    let diagnostic = format!("uniform `{name}` is bound differently in the two stages");
                    tracing::error!("{diagnostic}");
                    return Err(PipelineError::Link { diagnostic });
                }
                (Some(found), _) | (None, Some(found)) => found,
                (None, None) => {
                    tracing::error!(uniform = name, "uniform not declared by either stage");
                    return Err(PipelineError::UnknownUniform(name));
                }
            };
        }

        let inputs = vertex.inputs();
        let mut attributes = [0u32; 2];
        for attribute in Attribute::ALL {
            let name = attribute.name();
            attributes[attribute.index()] = inputs
                .iter()
                .find(|(input, _)| input.as_deref() == Some(name))
                .map(|&(_, location)| location)
                .ok_or_else(|| {
                    tracing::error!(attribute = name, "attribute not declared by the vertex stage");
                    PipelineError::UnknownAttribute(name)
                })?;
        }

        tracing::info!(?uniforms, ?attributes, "program linked");
        Ok(LinkedProgram {
            vertex,
            fragment,
            uniforms,
            attributes,
        })
    }
}

/// Both stages plus resolved binding tables.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    vertex: CompiledShader,
    fragment: CompiledShader,
    uniforms: [UniformBinding; 3],
    attributes: [u32; 2],
}

impl LinkedProgram {
    /// The quad program from the built-in shaders.
    ///
    /// # Errors
    ///
    /// Any construction error.
    pub fn quad() -> Result<Self, PipelineError> {
        ProgramBuilder::new()
            .vertex_shader(crate::shaders::QUAD_VERTEX_WGSL)?
            .fragment_shader(crate::shaders::QUAD_FRAGMENT_WGSL)?
            .link()
    }

    /// Where `uniform` is bound.
    #[inline]
    #[must_use]
    pub const fn uniform(&self, uniform: Uniform) -> UniformBinding {
        self.uniforms[uniform.index()]
    }

    /// Shader location of `attribute`.
    #[inline]
    #[must_use]
    pub const fn attribute(&self, attribute: Attribute) -> u32 {
        self.attributes[attribute.index()]
    }

    /// Vertex stage.
    #[must_use]
    pub const fn vertex(&self) -> &CompiledShader {
        &self.vertex
    }

    /// Fragment stage.
    #[must_use]
    pub const fn fragment(&self) -> &CompiledShader {
        &self.fragment
    }
}
