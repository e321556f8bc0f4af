//! State variables and their update programs.
//!
//! A state variable is one named channel of simulation state: a W x H grid of
//! RGBA float texels advanced once per tick by a user-supplied WGSL update
//! body. The scheduler owns two render targets per variable and alternates
//! between them, so an update program always reads the previous tick's state
//! of every variable it depends on, including itself.
//!
//! # The update contract
//!
//! An update body must define `fn update(coord: vec2<f32>) -> vec4<f32>`.
//! `coord` is the texel's normalized coordinate (0-1 on both axes). Every
//! declared dependency is available as a `texture_2d<f32>` global named
//! exactly after the dependency, sampled through `state_sampler`:
//!
//! ```ignore
//! fn update(coord: vec2<f32>) -> vec4<f32> {
//!     let p = textureSampleLevel(positionTexture, state_sampler, coord, 0.0);
//!     return vec4<f32>(fract(p.xy + vec2<f32>(params.speed, 0.0)), p.z, 1.0);
//! }
//! ```
//!
//! Custom uniforms appear as `params.<name>` after the built-in
//! `params.resolution`.
//!
//! # Example
//!
//! ```ignore
//! let config = VariableConfig::new(DRIFT)
//!     .with_uniform("speed", 0.002f32)
//!     .with_address_mode(AddressMode::Repeat);
//!
//! let position = scheduler.add_variable("positionTexture", config, seed)?;
//! scheduler.set_dependencies(position, &["positionTexture"]);
//! ```

use crate::error::SchedulerError;
use crate::textures::{AddressMode, SeedTexture};
use crate::uniforms::{CustomUniforms, UniformValue};

/// Binding names the generated program claims for itself.
const RESERVED_NAMES: &[&str] = &["params", "state_sampler"];

/// Handle to a registered state variable.
///
/// Returned by `add_variable` and passed back to dependency, uniform, and
/// texture accessors. Handles are plain indices into the registration order
/// and stay valid for the scheduler's whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Variable(pub(crate) usize);

/// Configuration for a state variable.
#[derive(Clone, Debug)]
pub struct VariableConfig {
    /// WGSL source defining `fn update(coord: vec2<f32>) -> vec4<f32>`.
    pub update_source: String,
    /// Custom uniforms exposed to the program as `params.<name>`.
    pub uniforms: CustomUniforms,
    /// Wrap behavior when the program samples outside 0-1.
    pub address_mode: AddressMode,
}

impl VariableConfig {
    /// Create a configuration from an update program body.
    ///
    /// # Panics
    ///
    /// Panics if the source does not define an `update` function. The full
    /// program is only compiled at scheduler initialization; this catches the
    /// common mistake of passing a bare expression early.
    pub fn new(update_source: impl Into<String>) -> Self {
        let update_source = update_source.into();
        assert!(
            update_source.contains("fn update"),
            "Update program must define fn update(coord: vec2<f32>) -> vec4<f32>"
        );
        Self {
            update_source,
            uniforms: CustomUniforms::new(),
            address_mode: AddressMode::default(),
        }
    }

    /// Declare a custom uniform with its initial value.
    ///
    /// Declaration order fixes the field order of the generated params
    /// struct.
    pub fn with_uniform<V: Into<UniformValue>>(mut self, name: &str, value: V) -> Self {
        self.uniforms.set(name, value);
        self
    }

    /// Set the wrap mode for dependency sampling.
    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_mode = mode;
        self
    }
}

/// Whether `name` can be used as a WGSL identifier.
///
/// Syntactic check only. Collisions with WGSL keywords surface as program
/// validation errors when the scheduler compiles the shader.
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One registered variable: configuration plus seed and dependency names.
#[derive(Clone, Debug)]
pub(crate) struct VariableEntry {
    pub name: String,
    pub config: VariableConfig,
    pub seed: SeedTexture,
    /// Dependency names as declared. Resolved to indices at initialization.
    pub dependencies: Vec<String>,
}

impl VariableEntry {
    /// Build the complete WGSL module for this variable's update pass.
    pub(crate) fn generate_shader(&self) -> String {
        generate_update_shader(
            &self.config.update_source,
            &self.config.uniforms,
            &unique_dependencies(&self.dependencies),
        )
    }
}

/// Registration-order store of variables, before any GPU resources exist.
#[derive(Clone, Debug, Default)]
pub(crate) struct VariableRegistry {
    entries: Vec<VariableEntry>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable. Name problems are reported here, everything that
    /// needs the full set waits for dependency resolution.
    pub fn add(
        &mut self,
        name: &str,
        config: VariableConfig,
        seed: SeedTexture,
    ) -> Result<Variable, SchedulerError> {
        if !is_valid_identifier(name) {
            return Err(SchedulerError::InvalidVariableName(name.to_string()));
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(SchedulerError::ReservedVariableName(name.to_string()));
        }
        if self.index_of(name).is_some() {
            return Err(SchedulerError::DuplicateVariable(name.to_string()));
        }
        let idx = self.entries.len();
        self.entries.push(VariableEntry {
            name: name.to_string(),
            config,
            seed,
            dependencies: Vec::new(),
        });
        Ok(Variable(idx))
    }

    /// Replace a variable's dependency list.
    pub fn set_dependencies(&mut self, variable: Variable, dependencies: &[&str]) {
        let entry = self
            .entries
            .get_mut(variable.0)
            .expect("Variable handle does not belong to this scheduler");
        entry.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
    }

    /// Get a variable's registry index by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Resolve every dependency name to a registry index.
    ///
    /// Returns one index list per variable, in registration order, with
    /// duplicate names collapsed to their first occurrence. Any name that
    /// matches nothing aborts with the offending pair.
    pub fn resolve_dependencies(&self) -> Result<Vec<Vec<usize>>, SchedulerError> {
        let mut resolved = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let mut indices = Vec::new();
            for dep in unique_dependencies(&entry.dependencies) {
                match self.index_of(dep) {
                    Some(idx) => indices.push(idx),
                    None => {
                        return Err(SchedulerError::UnknownDependency {
                            variable: entry.name.clone(),
                            dependency: dep.to_string(),
                        })
                    }
                }
            }
            resolved.push(indices);
        }
        Ok(resolved)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, variable: Variable) -> &VariableEntry {
        &self.entries[variable.0]
    }

    pub fn get_mut(&mut self, variable: Variable) -> &mut VariableEntry {
        &mut self.entries[variable.0]
    }

    pub fn entries(&self) -> &[VariableEntry] {
        &self.entries
    }
}

/// Dependency names in declaration order with duplicates dropped.
///
/// A duplicate would redeclare the same texture binding name, so each name
/// claims exactly one slot. Binding order and bind group construction both
/// go through this, keeping them aligned by construction.
pub(crate) fn unique_dependencies(dependencies: &[String]) -> Vec<&str> {
    let mut unique: Vec<&str> = Vec::with_capacity(dependencies.len());
    for dep in dependencies {
        if !unique.contains(&dep.as_str()) {
            unique.push(dep.as_str());
        }
    }
    unique
}

/// Build the complete WGSL module for an update pass.
///
/// Layout on bind group 0: binding 0 is the params uniform, binding 1 the
/// shared state sampler, bindings 2.. one texture per dependency named after
/// it. The fragment stage runs the user's `update` once per texel.
pub(crate) fn generate_update_shader(
    update_source: &str,
    uniforms: &CustomUniforms,
    dependencies: &[&str],
) -> String {
    let mut code = String::new();

    code.push_str("struct Params {\n    resolution: vec2<f32>,\n    _pad: vec2<f32>,\n");
    let fields = uniforms.to_wgsl_fields();
    if !fields.is_empty() {
        code.push_str(&fields);
        code.push('\n');
    }
    code.push_str("};\n\n");

    code.push_str("@group(0) @binding(0)\nvar<uniform> params: Params;\n");
    code.push_str("@group(0) @binding(1)\nvar state_sampler: sampler;\n");
    for (i, name) in dependencies.iter().enumerate() {
        code.push_str(&format!(
            "@group(0) @binding({})\nvar {}: texture_2d<f32>;\n",
            i + 2,
            name
        ));
    }
    code.push('\n');

    code.push_str(update_source);

    code.push_str(
        r#"

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> @builtin(position) vec4<f32> {
    // Fullscreen triangle, no vertex buffer
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    return vec4<f32>(positions[vertex_index], 0.0, 1.0);
}

@fragment
fn fs_main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) vec4<f32> {
    return update(frag_coord.xy / params.resolution);
}
"#,
    );

    code
}

/// Serialize one variable's params struct: the resolution header, then the
/// custom uniforms at their WGSL offsets.
pub(crate) fn params_bytes(width: u32, height: u32, uniforms: &CustomUniforms) -> Vec<u8> {
    let mut buf = Vec::with_capacity(params_byte_size(uniforms));
    buf.extend_from_slice(&(width as f32).to_le_bytes());
    buf.extend_from_slice(&(height as f32).to_le_bytes());
    buf.extend_from_slice(&0.0f32.to_le_bytes());
    buf.extend_from_slice(&0.0f32.to_le_bytes());
    buf.extend(uniforms.to_bytes());
    buf
}

/// Size of the params uniform buffer for a set of custom uniforms.
///
/// The 16-byte resolution header plus the custom fields, rounded up so the
/// buffer is never smaller than the WGSL struct.
pub(crate) fn params_byte_size(uniforms: &CustomUniforms) -> usize {
    16 + uniforms.byte_size()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    const MINIMAL_UPDATE: &str = r#"
fn update(coord: vec2<f32>) -> vec4<f32> {
    return vec4<f32>(coord, 0.0, 1.0);
}
"#;

    fn seed_4x4() -> SeedTexture {
        SeedTexture::zeros(4, 4)
    }

    // ========== VariableConfig Tests ==========

    #[test]
    fn test_config_defaults() {
        let config = VariableConfig::new(MINIMAL_UPDATE);
        assert!(config.uniforms.is_empty());
        assert_eq!(config.address_mode, AddressMode::ClampToEdge);
    }

    #[test]
    fn test_config_builder() {
        let config = VariableConfig::new(MINIMAL_UPDATE)
            .with_uniform("time", 0.0f32)
            .with_uniform("speed", 0.5f32)
            .with_address_mode(AddressMode::Repeat);

        assert_eq!(config.uniforms.len(), 2);
        assert_eq!(config.address_mode, AddressMode::Repeat);

        let names: Vec<&str> = config.uniforms.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["time", "speed"]);
    }

    #[test]
    #[should_panic(expected = "must define fn update")]
    fn test_config_rejects_bare_expression() {
        VariableConfig::new("return vec4<f32>(0.0);");
    }

    // ========== Identifier Validation Tests ==========

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("position"));
        assert!(is_valid_identifier("trailTexture"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("v2"));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("has space"));
        assert!(!is_valid_identifier("dash-name"));
        assert!(!is_valid_identifier("dot.name"));
        assert!(!is_valid_identifier("naïve"));
    }

    // ========== VariableRegistry Tests ==========

    #[test]
    fn test_registry_add_assigns_distinct_handles() {
        let mut registry = VariableRegistry::new();
        let a = registry
            .add("a", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap();
        let b = registry
            .add("b", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.index_of("a"), Some(0));
        assert_eq!(registry.index_of("b"), Some(1));
        assert_eq!(registry.index_of("c"), None);
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let mut registry = VariableRegistry::new();
        registry
            .add("state", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap();
        let err = registry
            .add("state", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap_err();

        assert!(matches!(err, SchedulerError::DuplicateVariable(ref n) if n == "state"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_rejects_invalid_names() {
        let mut registry = VariableRegistry::new();
        let err = registry
            .add("2fast", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidVariableName(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_rejects_reserved_names() {
        let mut registry = VariableRegistry::new();
        for name in ["params", "state_sampler"] {
            let err = registry
                .add(name, VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
                .unwrap_err();
            assert!(matches!(err, SchedulerError::ReservedVariableName(_)));
        }
    }

    #[test]
    fn test_resolve_dependencies_in_declaration_order() {
        let mut registry = VariableRegistry::new();
        let pos = registry
            .add("position", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap();
        let trail = registry
            .add("trail", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap();
        registry.set_dependencies(pos, &["position", "trail"]);
        registry.set_dependencies(trail, &["trail", "position"]);

        let resolved = registry.resolve_dependencies().unwrap();
        assert_eq!(resolved, vec![vec![0, 1], vec![1, 0]]);
    }

    #[test]
    fn test_resolve_reports_unknown_dependency() {
        let mut registry = VariableRegistry::new();
        let trail = registry
            .add("trail", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap();
        registry.set_dependencies(trail, &["trail", "positon"]);

        let err = registry.resolve_dependencies().unwrap_err();
        match err {
            SchedulerError::UnknownDependency {
                variable,
                dependency,
            } => {
                assert_eq!(variable, "trail");
                assert_eq!(dependency, "positon");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_collapses_duplicate_dependencies() {
        let mut registry = VariableRegistry::new();
        let a = registry
            .add("a", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap();
        registry
            .add("b", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap();
        registry.set_dependencies(a, &["a", "a", "b", "a"]);

        let resolved = registry.resolve_dependencies().unwrap();
        assert_eq!(resolved[0], vec![0, 1]);
    }

    #[test]
    fn test_variables_without_dependencies_resolve_empty() {
        let mut registry = VariableRegistry::new();
        registry
            .add("lonely", VariableConfig::new(MINIMAL_UPDATE), seed_4x4())
            .unwrap();
        let resolved = registry.resolve_dependencies().unwrap();
        assert_eq!(resolved, vec![Vec::<usize>::new()]);
    }

    #[test]
    #[should_panic(expected = "does not belong to this scheduler")]
    fn test_foreign_handle_panics() {
        let mut registry = VariableRegistry::new();
        registry.set_dependencies(Variable(3), &["x"]);
    }

    // ========== Shader Generation Tests ==========

    #[test]
    fn test_generated_shader_structure() {
        let uniforms = CustomUniforms::new();
        let shader = generate_update_shader(MINIMAL_UPDATE, &uniforms, &[]);

        assert!(shader.contains("struct Params"));
        assert!(shader.contains("resolution: vec2<f32>"));
        assert!(shader.contains("var<uniform> params: Params"));
        assert!(shader.contains("var state_sampler: sampler"));
        assert!(shader.contains("fn update"));
        assert!(shader.contains("fn vs_main"));
        assert!(shader.contains("fn fs_main"));
        // No dependencies, so nothing past the sampler binding.
        assert!(!shader.contains("@binding(2)"));
    }

    #[test]
    fn test_generated_shader_binds_dependencies_in_order() {
        let uniforms = CustomUniforms::new();
        let shader = generate_update_shader(
            MINIMAL_UPDATE,
            &uniforms,
            &["positionTexture", "trailTexture"],
        );

        assert!(shader.contains("@binding(2)\nvar positionTexture: texture_2d<f32>;"));
        assert!(shader.contains("@binding(3)\nvar trailTexture: texture_2d<f32>;"));

        let pos = shader.find("var positionTexture").unwrap();
        let trail = shader.find("var trailTexture").unwrap();
        assert!(pos < trail);
    }

    #[test]
    fn test_generated_shader_includes_custom_uniform_fields() {
        let mut uniforms = CustomUniforms::new();
        uniforms.set("time", 0.0f32);
        uniforms.set("wind", Vec2::ZERO);
        let shader = generate_update_shader(MINIMAL_UPDATE, &uniforms, &[]);

        assert!(shader.contains("time: f32,"));
        assert!(shader.contains("wind: vec2<f32>,"));

        let time = shader.find("time: f32").unwrap();
        let wind = shader.find("wind: vec2<f32>").unwrap();
        assert!(time < wind);
    }

    // ========== Params Byte Layout Tests ==========

    #[test]
    fn test_params_header_holds_resolution() {
        let uniforms = CustomUniforms::new();
        let bytes = params_bytes(32, 64, &uniforms);

        assert_eq!(bytes.len(), 16);
        assert_eq!(params_byte_size(&uniforms), 16);
        assert_eq!(f32::from_le_bytes(bytes[0..4].try_into().unwrap()), 32.0);
        assert_eq!(f32::from_le_bytes(bytes[4..8].try_into().unwrap()), 64.0);
    }

    #[test]
    fn test_params_custom_fields_start_after_header() {
        let mut uniforms = CustomUniforms::new();
        uniforms.set("time", 2.5f32);
        let bytes = params_bytes(8, 8, &uniforms);

        assert_eq!(f32::from_le_bytes(bytes[16..20].try_into().unwrap()), 2.5);
        // Buffer size rounds the tail up to 16.
        assert_eq!(params_byte_size(&uniforms), 32);
    }

    #[test]
    fn test_params_vec2_aligns_to_eight() {
        let mut uniforms = CustomUniforms::new();
        uniforms.set("scale", 1.0f32);
        uniforms.set("wind", Vec2::new(3.0, 4.0));
        let bytes = params_bytes(8, 8, &uniforms);

        // scale at 16, then 4 bytes of padding, wind at 24.
        assert_eq!(f32::from_le_bytes(bytes[24..28].try_into().unwrap()), 3.0);
        assert_eq!(f32::from_le_bytes(bytes[28..32].try_into().unwrap()), 4.0);
    }

    // ========== WGSL Validation Tests ==========

    /// Validates WGSL code using naga.
    fn validate_wgsl(code: &str) -> Result<(), String> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(())
    }

    #[test]
    fn test_minimal_program_validates() {
        let shader = generate_update_shader(MINIMAL_UPDATE, &CustomUniforms::new(), &[]);
        validate_wgsl(&shader).expect("Minimal update program should be valid");
    }

    #[test]
    fn test_program_with_dependencies_validates() {
        let body = r#"
fn update(coord: vec2<f32>) -> vec4<f32> {
    let p = textureSampleLevel(positionTexture, state_sampler, coord, 0.0);
    let t = textureSampleLevel(trailTexture, state_sampler, coord, 0.0);
    return vec4<f32>(fract(p.xy + t.xy * 0.01), p.z, 1.0);
}
"#;
        let shader = generate_update_shader(
            body,
            &CustomUniforms::new(),
            &["positionTexture", "trailTexture"],
        );
        validate_wgsl(&shader).expect("Two-dependency program should be valid");
    }

    #[test]
    fn test_program_with_uniforms_validates() {
        let mut uniforms = CustomUniforms::new();
        uniforms.set("time", 0.0f32);
        uniforms.set("speed", 0.1f32);
        let body = r#"
fn update(coord: vec2<f32>) -> vec4<f32> {
    let s = sin(params.time) * params.speed;
    return vec4<f32>(coord + vec2<f32>(s), 0.0, 1.0);
}
"#;
        let shader = generate_update_shader(body, &uniforms, &[]);
        validate_wgsl(&shader).expect("Uniform-reading program should be valid");
    }

    #[test]
    fn test_coordinate_encoding_program_validates() {
        // The pattern used to check tick domain coverage: each texel writes
        // its own coordinates back out.
        let body = r#"
fn update(coord: vec2<f32>) -> vec4<f32> {
    let texel = floor(coord * params.resolution);
    return vec4<f32>(texel, coord.x, 1.0);
}
"#;
        let shader = generate_update_shader(body, &CustomUniforms::new(), &[]);
        validate_wgsl(&shader).expect("Coordinate encoding program should be valid");
    }

    #[test]
    fn test_entry_shader_uses_declared_dependencies() {
        let mut registry = VariableRegistry::new();
        let trail = registry
            .add(
                "trail",
                VariableConfig::new(
                    r#"
fn update(coord: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(trail, state_sampler, coord, 0.0) * 0.95;
}
"#,
                ),
                seed_4x4(),
            )
            .unwrap();
        registry.set_dependencies(trail, &["trail"]);

        let shader = registry.get(trail).generate_shader();
        assert!(shader.contains("var trail: texture_2d<f32>;"));
        validate_wgsl(&shader).expect("Self-dependent program should be valid");
    }
}
