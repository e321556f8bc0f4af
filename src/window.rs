use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use texsched::{
    AddressMode, ComputeScheduler, ParticleRasterizer, PresentationQuad, SimClock, Variable,
    VariableConfig,
};

use crate::shader::{
    position_seed, GRID_SIDE, OUTPUT_SIZE, PARTICLE_COUNT, POINT_SIZE, POSITION_UPDATE,
    ROTATE_ANGLE, SENSOR_ANGLE, SENSOR_OFFSET, STEP_SIZE, TRAIL_UPDATE,
};

pub struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    scheduler: ComputeScheduler,
    position: Variable,
    rasterizer: ParticleRasterizer,
    quad: PresentationQuad,
    clock: SimClock,
    capture_index: u32,
}

impl GpuState {
    pub async fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window).unwrap();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .unwrap();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await
            .unwrap();

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let mut scheduler = ComputeScheduler::new(GRID_SIDE, GRID_SIDE);

        let position = scheduler
            .add_variable(
                "positionTexture",
                VariableConfig::new(POSITION_UPDATE)
                    .with_uniform("time", 0.0f32)
                    .with_uniform("sa", SENSOR_ANGLE)
                    .with_uniform("ra", ROTATE_ANGLE)
                    .with_uniform("so", SENSOR_OFFSET)
                    .with_uniform("ss", STEP_SIZE)
                    .with_address_mode(AddressMode::Repeat),
                position_seed(),
            )
            .unwrap();

        let trail_seed = scheduler.create_zero_texture();
        let trail = scheduler
            .add_variable(
                "trailTexture",
                VariableConfig::new(TRAIL_UPDATE).with_address_mode(AddressMode::Repeat),
                trail_seed,
            )
            .unwrap();

        scheduler.set_dependencies(position, &["positionTexture", "trailTexture"]);
        scheduler.set_dependencies(trail, &["trailTexture", "positionTexture"]);
        scheduler.initialize(&adapter, &device, &queue).unwrap();

        let rasterizer = ParticleRasterizer::new(&device, OUTPUT_SIZE, OUTPUT_SIZE, PARTICLE_COUNT)
            .unwrap()
            .with_point_size(POINT_SIZE);

        let mut quad = PresentationQuad::new(&device, config.format);
        quad.set_source(&device, rasterizer.output_view());

        Self {
            surface,
            device,
            queue,
            config,
            scheduler,
            position,
            rasterizer,
            quad,
            clock: SimClock::new(),
            capture_index: 0,
        }
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    fn toggle_pause(&mut self) {
        self.clock.toggle_pause();
        if self.clock.is_paused() {
            log::info!("Paused at tick {}", self.clock.ticks());
        } else {
            log::info!("Resumed");
        }
    }

    /// Save the current off-screen buffer as a PNG next to the executable.
    fn capture(&mut self) {
        match self.rasterizer.read_back(&self.device, &self.queue) {
            Ok(pixels) => {
                let path = format!("slime_{:04}.png", self.capture_index);
                match image::save_buffer(
                    &path,
                    &pixels,
                    self.rasterizer.width(),
                    self.rasterizer.height(),
                    image::ExtendedColorType::Rgba8,
                ) {
                    Ok(()) => {
                        log::info!("Captured {}", path);
                        self.capture_index += 1;
                    }
                    Err(e) => log::error!("Failed to write {}: {}", path, e),
                }
            }
            Err(e) => log::error!("Readback failed: {}", e),
        }
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let (elapsed, _delta) = self.clock.tick();

        if !self.clock.is_paused() {
            self.scheduler.set_uniform(self.position, "time", elapsed);
            self.scheduler.compute(&self.device, &self.queue);
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.rasterizer.render(
            &self.device,
            &self.queue,
            &mut encoder,
            self.scheduler.current_texture(self.position),
        );

        // Present pass
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.quad.draw(&mut render_pass);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

pub struct App {
    window: Option<Arc<Window>>,
    gpu_state: Option<GpuState>,
}

impl App {
    pub fn new() -> Self {
        Self {
            window: None,
            gpu_state: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window_attrs = Window::default_attributes()
                .with_title("texsched - slime mold")
                .with_inner_size(winit::dpi::LogicalSize::new(1024, 1024));

            let window = Arc::new(event_loop.create_window(window_attrs).unwrap());
            self.window = Some(window.clone());
            self.gpu_state = Some(pollster::block_on(GpuState::new(window)));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.resize(physical_size);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match physical_key {
                PhysicalKey::Code(KeyCode::Space) => {
                    if let Some(gpu_state) = &mut self.gpu_state {
                        gpu_state.toggle_pause();
                    }
                }
                PhysicalKey::Code(KeyCode::KeyS) => {
                    if let Some(gpu_state) = &mut self.gpu_state {
                        gpu_state.capture();
                    }
                }
                PhysicalKey::Code(KeyCode::Escape) => {
                    event_loop.exit();
                }
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    match gpu_state.render() {
                        Ok(_) => {}
                        Err(wgpu::SurfaceError::Lost) => {
                            gpu_state.resize(winit::dpi::PhysicalSize {
                                width: gpu_state.config.width,
                                height: gpu_state.config.height,
                            })
                        }
                        Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                        Err(e) => log::error!("Render error: {:?}", e),
                    }
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
