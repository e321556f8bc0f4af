//! Double-buffered update scheduling for state variables.
//!
//! Every variable owns two Rgba32Float render targets. During a tick the
//! scheduler runs one fullscreen pass per variable, reading dependencies from
//! each variable's current target and writing the result to its other target.
//! A single parity bit owned by the scheduler decides which target is which,
//! and it flips exactly once per tick, after every variable has rendered. Two
//! consequences fall out of that:
//!
//! - Update programs always see the previous tick's state of every
//!   dependency, including the variable itself. Registration order does not
//!   leak into results.
//! - [`ComputeScheduler::current_texture`] is stable between ticks, so render
//!   passes can bind it for a whole frame.

use wgpu::util::DeviceExt;

use crate::error::SchedulerError;
use crate::gpu::STATE_FORMAT;
use crate::textures::SeedTexture;
use crate::uniforms::UniformValue;
use crate::variable::{params_byte_size, params_bytes, Variable, VariableConfig, VariableRegistry};

/// Which of a variable's two targets holds current state.
///
/// Shared by every variable so a tick is a single atomic step: all passes
/// read parity `p` and write parity `1 - p`, then the bit flips.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PingPong {
    current: usize,
}

impl PingPong {
    /// Index of the targets holding the latest completed tick.
    fn read_index(self) -> usize {
        self.current
    }

    /// Index of the targets the next tick renders into.
    fn write_index(self) -> usize {
        self.current ^ 1
    }

    fn flip(&mut self) {
        self.current ^= 1;
    }
}

/// GPU resources backing one variable after initialization.
struct VariableGpu {
    targets: [wgpu::Texture; 2],
    views: [wgpu::TextureView; 2],
    params_buffer: wgpu::Buffer,
    pipeline: wgpu::RenderPipeline,
    /// `bind_groups[p]` binds every dependency's target `p`.
    bind_groups: [wgpu::BindGroup; 2],
}

/// Everything built in the first initialization pass, before bind groups can
/// reference other variables' views.
struct PendingVariable {
    targets: [wgpu::Texture; 2],
    views: [wgpu::TextureView; 2],
    sampler: wgpu::Sampler,
    params_buffer: wgpu::Buffer,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// Advances a set of named state variables on the GPU, one tick at a time.
///
/// Lifecycle: register variables and dependencies, call
/// [`initialize`](Self::initialize) once with a device, then
/// [`compute`](Self::compute) per tick. Texture accessors and uniform updates
/// work after initialization; registration does not.
///
/// # Example
///
/// ```ignore
/// let mut scheduler = ComputeScheduler::new(256, 256);
/// let trail = scheduler.add_variable("trail", trail_config, seed)?;
/// scheduler.set_dependencies(trail, &["trail"]);
/// scheduler.initialize(&adapter, &device, &queue)?;
///
/// loop {
///     scheduler.set_uniform(trail, "time", clock.elapsed());
///     scheduler.compute(&device, &queue);
///     draw(scheduler.current_texture(trail));
/// }
/// ```
pub struct ComputeScheduler {
    width: u32,
    height: u32,
    registry: VariableRegistry,
    /// `resolved[i]` holds the registry indices of variable i's unique
    /// dependencies, in binding order. Filled at initialization.
    resolved: Vec<Vec<usize>>,
    variables: Option<Vec<VariableGpu>>,
    parity: PingPong,
}

impl ComputeScheduler {
    /// Create a scheduler whose variables are all `width` x `height` texels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            registry: VariableRegistry::new(),
            resolved: Vec::new(),
            variables: None,
            parity: PingPong::default(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of registered variables.
    pub fn variable_count(&self) -> usize {
        self.registry.len()
    }

    /// A blank seed matching the scheduler's resolution.
    pub fn create_zero_texture(&self) -> SeedTexture {
        SeedTexture::zeros(self.width, self.height)
    }

    /// Register a state variable with its update program and seed data.
    ///
    /// The returned handle identifies the variable in every later call.
    ///
    /// # Panics
    ///
    /// Panics if called after [`initialize`](Self::initialize), or if the
    /// seed's size differs from the scheduler resolution.
    pub fn add_variable(
        &mut self,
        name: &str,
        config: VariableConfig,
        seed: SeedTexture,
    ) -> Result<Variable, SchedulerError> {
        assert!(
            self.variables.is_none(),
            "Variables must be added before initialize()"
        );
        assert_eq!(
            (seed.width, seed.height),
            (self.width, self.height),
            "Seed texture size must match the scheduler resolution"
        );
        self.registry.add(name, config, seed)
    }

    /// Declare which variables' state `variable`'s update program reads.
    ///
    /// Each name becomes a `texture_2d<f32>` global of the same name in the
    /// generated program. Listing the variable itself is how a program reads
    /// its own previous state. Names are resolved at initialization, so
    /// variables registered in any order can depend on each other.
    ///
    /// # Panics
    ///
    /// Panics if called after [`initialize`](Self::initialize).
    pub fn set_dependencies(&mut self, variable: Variable, dependencies: &[&str]) {
        assert!(
            self.variables.is_none(),
            "Dependencies must be set before initialize()"
        );
        self.registry.set_dependencies(variable, dependencies);
    }

    /// Look up a registered variable's handle by name.
    pub fn variable(&self, name: &str) -> Option<Variable> {
        self.registry.index_of(name).map(Variable)
    }

    /// Set a custom uniform's value.
    ///
    /// Before initialization this may declare new uniforms; afterwards the
    /// params struct is baked into the compiled program, so only values of
    /// already-declared uniforms can change. New values reach the GPU on the
    /// next [`compute`](Self::compute).
    pub fn set_uniform<V: Into<UniformValue>>(&mut self, variable: Variable, name: &str, value: V) {
        if self.variables.is_some() {
            assert!(
                self.registry.get(variable).config.uniforms.get(name).is_some(),
                "Uniform '{}' must be declared before initialize()",
                name
            );
        }
        self.registry.get_mut(variable).config.uniforms.set(name, value);
    }

    /// Read back a custom uniform's current CPU-side value.
    pub fn uniform(&self, variable: Variable, name: &str) -> Option<UniformValue> {
        self.registry.get(variable).config.uniforms.get(name).copied()
    }

    /// Build all GPU resources: render targets, samplers, uniform buffers,
    /// and one specialized pipeline per variable. Seeds are uploaded to both
    /// targets so [`previous_texture`](Self::previous_texture) is valid
    /// before the first tick.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn initialize(
        &mut self,
        adapter: &wgpu::Adapter,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<(), SchedulerError> {
        assert!(
            self.variables.is_none(),
            "initialize() must only be called once"
        );

        if self.width == 0 || self.height == 0 {
            return Err(SchedulerError::ZeroResolution);
        }
        let max_dimension = device.limits().max_texture_dimension_2d;
        let requested = self.width.max(self.height);
        if requested > max_dimension {
            return Err(SchedulerError::ResolutionTooLarge {
                requested,
                max: max_dimension,
            });
        }
        let float_target = adapter
            .get_texture_format_features(STATE_FORMAT)
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT);
        if !float_target {
            return Err(SchedulerError::FloatTargetUnsupported);
        }
        if device.limits().max_sampled_textures_per_shader_stage == 0 {
            return Err(SchedulerError::VertexTextureUnsupported);
        }

        self.resolved = self.registry.resolve_dependencies()?;

        log::info!(
            "Initializing compute scheduler: {} variables at {}x{}",
            self.registry.len(),
            self.width,
            self.height
        );

        let size = wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        };

        // First pass: per-variable resources that don't reference other
        // variables.
        let mut pending = Vec::with_capacity(self.registry.len());
        for (i, entry) in self.registry.entries().iter().enumerate() {
            let targets = ["A", "B"].map(|tag| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("Variable '{}' Target {}", entry.name, tag)),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: STATE_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_DST
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            });

            // Both targets get the seed: the first tick reads parity A while
            // writing parity B, and previous_texture() must already hold
            // sensible data.
            for target in &targets {
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: target,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    entry.seed.as_bytes(),
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(entry.seed.bytes_per_row()),
                        rows_per_image: None,
                    },
                    size,
                );
            }

            let views = [
                targets[0].create_view(&wgpu::TextureViewDescriptor::default()),
                targets[1].create_view(&wgpu::TextureViewDescriptor::default()),
            ];

            let address_mode = entry.config.address_mode.into();
            let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(&format!("Variable '{}' Sampler", entry.name)),
                address_mode_u: address_mode,
                address_mode_v: address_mode,
                address_mode_w: address_mode,
                mag_filter: wgpu::FilterMode::Nearest,
                min_filter: wgpu::FilterMode::Nearest,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            });

            let mut uniform_data = params_bytes(self.width, self.height, &entry.config.uniforms);
            uniform_data.resize(params_byte_size(&entry.config.uniforms), 0);
            let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Variable '{}' Params Buffer", entry.name)),
                contents: &uniform_data,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

            let shader_source = entry.generate_shader();
            let (pipeline, bind_group_layout) = create_update_pipeline(
                device,
                &entry.name,
                &shader_source,
                self.resolved[i].len() as u32,
            );

            log::debug!(
                "Variable '{}': {} dependencies, {} params bytes",
                entry.name,
                self.resolved[i].len(),
                uniform_data.len()
            );

            pending.push(PendingVariable {
                targets,
                views,
                sampler,
                params_buffer,
                pipeline,
                bind_group_layout,
            });
        }

        // Second pass: bind groups, which reference dependency views across
        // variables. One per parity.
        let mut bind_groups_all = Vec::with_capacity(pending.len());
        for (i, entry) in self.registry.entries().iter().enumerate() {
            let bind_groups = [0usize, 1].map(|p| {
                let mut entries = vec![
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: pending[i].params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&pending[i].sampler),
                    },
                ];
                for (slot, &dep) in self.resolved[i].iter().enumerate() {
                    entries.push(wgpu::BindGroupEntry {
                        binding: (slot + 2) as u32,
                        resource: wgpu::BindingResource::TextureView(&pending[dep].views[p]),
                    });
                }
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!(
                        "Variable '{}' Bind Group {}",
                        entry.name,
                        ["A", "B"][p]
                    )),
                    layout: &pending[i].bind_group_layout,
                    entries: &entries,
                })
            });
            bind_groups_all.push(bind_groups);
        }

        self.variables = Some(
            pending
                .into_iter()
                .zip(bind_groups_all)
                .map(|(p, bind_groups)| VariableGpu {
                    targets: p.targets,
                    views: p.views,
                    params_buffer: p.params_buffer,
                    pipeline: p.pipeline,
                    bind_groups,
                })
                .collect(),
        );
        Ok(())
    }

    /// Advance every variable by one tick.
    ///
    /// Uploads current uniform values, renders each variable's update pass
    /// from the current targets into the write targets, submits, then flips
    /// parity once. Each pass clears its target first, so update programs
    /// fully define the new state.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler is not initialized.
    pub fn compute(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let variables = self
            .variables
            .as_ref()
            .expect("initialize() must be called before compute()");

        for (entry, var) in self.registry.entries().iter().zip(variables) {
            let mut uniform_data = params_bytes(self.width, self.height, &entry.config.uniforms);
            uniform_data.resize(params_byte_size(&entry.config.uniforms), 0);
            queue.write_buffer(&var.params_buffer, 0, &uniform_data);
        }

        let read = self.parity.read_index();
        let write = self.parity.write_index();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Compute Scheduler Encoder"),
        });

        for (entry, var) in self.registry.entries().iter().zip(variables) {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&format!("Variable '{}' Update Pass", entry.name)),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &var.views[write],
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&var.pipeline);
            pass.set_bind_group(0, &var.bind_groups[read], &[]);
            pass.draw(0..3, 0..1);
        }

        queue.submit(std::iter::once(encoder.finish()));
        self.parity.flip();
    }

    /// View of the variable's latest completed state.
    ///
    /// Stable until the next [`compute`](Self::compute) call.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler is not initialized.
    pub fn current_texture(&self, variable: Variable) -> &wgpu::TextureView {
        let variables = self
            .variables
            .as_ref()
            .expect("initialize() must be called before texture access");
        &variables[variable.0].views[self.parity.read_index()]
    }

    /// View of the variable's state one tick behind
    /// [`current_texture`](Self::current_texture).
    ///
    /// Before the first tick both views hold the seed.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler is not initialized.
    pub fn previous_texture(&self, variable: Variable) -> &wgpu::TextureView {
        let variables = self
            .variables
            .as_ref()
            .expect("initialize() must be called before texture access");
        &variables[variable.0].views[self.parity.write_index()]
    }

    /// Release all GPU resources.
    ///
    /// Dropping the scheduler releases them too; this makes the point of
    /// release explicit for hosts that keep the device alive afterwards.
    pub fn dispose(self) {
        if let Some(variables) = self.variables {
            log::debug!("Disposing {} compute variables", variables.len());
            for var in &variables {
                var.params_buffer.destroy();
                var.targets[0].destroy();
                var.targets[1].destroy();
            }
        }
    }
}

/// Build the render pipeline and bind group layout for one variable's update
/// pass.
///
/// Layout: binding 0 the params uniform, binding 1 the state sampler,
/// bindings 2.. one non-filterable float texture per dependency. Rgba32Float
/// is not filterable without extra features, so the sampler slot is
/// non-filtering and programs sample with `textureSampleLevel`.
fn create_update_pipeline(
    device: &wgpu::Device,
    name: &str,
    shader_source: &str,
    dependency_count: u32,
) -> (wgpu::RenderPipeline, wgpu::BindGroupLayout) {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("Variable '{}' Update Shader", name)),
        source: wgpu::ShaderSource::Wgsl(shader_source.into()),
    });

    let mut layout_entries = vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
            count: None,
        },
    ];
    for i in 0..dependency_count {
        layout_entries.push(wgpu::BindGroupLayoutEntry {
            binding: 2 + i,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("Variable '{}' Bind Group Layout", name)),
        entries: &layout_entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("Variable '{}' Pipeline Layout", name)),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("Variable '{}' Update Pipeline", name)),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: STATE_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    (pipeline, bind_group_layout)
}
