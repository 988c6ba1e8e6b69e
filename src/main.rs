// =============================================================================
// LEARN VULKAN - Step-by-step triangle bring-up
// =============================================================================
//
// A minimal Vulkan application: create a window, bring up a device and
// swapchain, and draw one hard-coded triangle per frame.
//
// BRING-UP ORDER:
//   instance -> debug messenger -> surface -> physical device
//   -> logical device -> swapchain -> image views -> render pass
//   -> pipeline -> framebuffers -> command pool/buffer -> sync objects
//
// FRAME FLOW:
// 1. Wait for the previous frame's fence
// 2. Acquire a swapchain image
// 3. Record the triangle draw
// 4. Submit to the graphics queue
// 5. Present on the present queue
//
// =============================================================================

mod backend;
mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

use backend::sync::FrameSync;
use backend::{pipeline, Swapchain, VulkanDevice};
use config::Config;

/// Compiled shader bytecode, produced by build.rs from the GLSL sources
/// next to it.
const VERT_SHADER_PATH: &str = "data/shaders/vert.spv";
const FRAG_SHADER_PATH: &str = "data/shaders/frag.spv";

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    init_logging();

    let config = Config::load();
    log::info!("Starting Vulkan bring-up");
    log::info!("Window: {}x{}", config.window.width, config.window.height);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// RENDERER
// =============================================================================

/// All GPU-side state needed to draw the triangle.
///
/// IMPORTANT: raw handles owned here are destroyed in Drop in reverse
/// order of creation, after waiting for the device to go idle.
struct Renderer {
    device: Arc<VulkanDevice>,
    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    /// Index-aligned with the swapchain images and views
    framebuffers: Vec<vk::Framebuffer>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    sync: FrameSync,
    clear_color: [f32; 4],
}

impl Renderer {
    /// Run the whole bring-up sequence against a freshly created window.
    fn new(window: &Window, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Instance, surface, device and queues
        // ─────────────────────────────────────────────────────────────────────
        let device = VulkanDevice::new(
            window,
            &config.window.title,
            config.debug.validation_layers,
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Swapchain and image views
        // ─────────────────────────────────────────────────────────────────────
        let size = window.inner_size();
        let swapchain = Swapchain::new(device.clone(), size.width, size.height)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Render pass, pipeline, framebuffers
        // ─────────────────────────────────────────────────────────────────────
        let render_pass = pipeline::create_render_pass(&device, swapchain.format)?;
        let (gfx_pipeline, pipeline_layout) = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            Path::new(VERT_SHADER_PATH),
            Path::new(FRAG_SHADER_PATH),
        )?;
        let framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            render_pass,
            swapchain.extent,
        )?;
        log::info!("Created {} framebuffers", framebuffers.len());

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Command pool and the single reusable command buffer
        // ─────────────────────────────────────────────────────────────────────
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_family)
            // The one buffer is re-recorded every frame
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffer")?[0];
        log::info!("Command pool and buffer created");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Synchronization primitives
        // ─────────────────────────────────────────────────────────────────────
        let sync = FrameSync::new(&device)?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            device,
            swapchain,
            render_pass,
            pipeline_layout,
            pipeline: gfx_pipeline,
            framebuffers,
            command_pool,
            command_buffer,
            sync,
            clear_color: config.graphics.clear_color,
        })
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame: wait -> acquire -> record -> submit -> present.
    ///
    /// This is the hot path - called every frame.
    fn draw_frame(&mut self) -> Result<()> {
        let device = &self.device.device;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait for the previous frame, then re-arm the fence
        // ─────────────────────────────────────────────────────────────────────
        unsafe {
            device
                .wait_for_fences(&[self.sync.in_flight_fence], true, u64::MAX)
                .context("Failed to wait for frame fence")?;
            device
                .reset_fences(&[self.sync.in_flight_fence])
                .context("Failed to reset frame fence")?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire the next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        // The call hands back an index immediately; the image itself is only
        // writable once the semaphore fires.
        let (image_index, _suboptimal) = self
            .swapchain
            .acquire_next_image(u64::MAX, self.sync.image_available)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Record the triangle draw for this image
        // ─────────────────────────────────────────────────────────────────────
        unsafe {
            device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
        }
        self.record_commands(image_index)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Submit, waiting on acquire and signaling present + fence
        // ─────────────────────────────────────────────────────────────────────
        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [self.sync.render_finished];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .queue_submit(
                    self.device.graphics_queue,
                    &[submit_info],
                    self.sync.in_flight_fence,
                )
                .context("Failed to submit draw commands")?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Present the image once rendering finishes
        // ─────────────────────────────────────────────────────────────────────
        self.swapchain.present(
            self.device.present_queue,
            image_index,
            &[self.sync.render_finished],
        )?;

        Ok(())
    }

    /// Record the render pass for one swapchain image.
    fn record_commands(&self, image_index: u32) -> Result<()> {
        let device = &self.device.device;
        let cmd = self.command_buffer;
        let extent = self.swapchain.extent;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];

        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default();
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
            // The whole triangle lives in the vertex shader
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device
                .end_command_buffer(cmd)
                .context("Failed to end command buffer")?;
        }

        Ok(())
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish before destroying anything
        let _ = self.device.wait_idle();

        unsafe {
            // Destroy in reverse order of creation!

            // 1. Sync objects
            self.sync.destroy(&self.device.device);

            // 2. Command pool (also frees the command buffer)
            self.device
                .device
                .destroy_command_pool(self.command_pool, None);

            // 3. Framebuffers, pipeline, render pass
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device
                .device
                .destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.device.destroy_render_pass(self.render_pass, None);

            // 4. Swapchain and device clean up after themselves when dropped
        }

        log::info!("Cleanup complete");
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Fixed-size window: there is no swapchain recreation path, so
        // resizing is disabled up front.
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, &self.config) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:?}", e);
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            // ─────────────────────────────────────────────────────────────────
            // CLOSE REQUEST
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                // Let in-flight GPU work drain before teardown starts
                if let Some(ref renderer) = self.renderer {
                    let _ = renderer.device.wait_idle();
                }
                event_loop.exit();
            }

            // ─────────────────────────────────────────────────────────────────
            // REDRAW REQUESTED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::RedrawRequested => {
                if let Some(ref mut renderer) = self.renderer {
                    // A failed frame is logged, not fatal; the loop goes on
                    if let Err(e) = renderer.draw_frame() {
                        log::error!("Render error: {:?}", e);
                    }
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// Request another redraw to keep the frame loop running.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
