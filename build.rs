// Compile the GLSL shader sources into the SPIR-V files the app loads at
// startup. Uses glslc from the Vulkan SDK; a missing glslc is a warning
// rather than a build failure so the crate still builds without it.

use std::path::Path;
use std::process::Command;

const SHADERS: &[(&str, &str)] = &[
    ("data/shaders/shader.vert", "data/shaders/vert.spv"),
    ("data/shaders/shader.frag", "data/shaders/frag.spv"),
];

fn main() {
    println!("cargo:rerun-if-changed=data/shaders/");

    for (input, output) in SHADERS {
        compile_shader(input, output);
    }
}

fn compile_shader(input: &str, output: &str) {
    let result = Command::new("glslc")
        .arg(Path::new(input))
        .arg("-o")
        .arg(Path::new(output))
        .status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            eprintln!("Warning: glslc not found ({})", e);
            eprintln!("Compile the shaders manually before running:");
            eprintln!("  glslc {} -o {}", input, output);
        }
    }
}
