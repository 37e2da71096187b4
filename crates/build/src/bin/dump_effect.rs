//! Effect compilation tool
//!
//! This binary compiles a WGFX effect file and either dumps the generated modules
//! to stdout or writes an effect bundle (JSON manifest plus WGSL files) to a
//! directory.

use std::env;
use std::fs;
use std::path::Path;
use std::process;
use wgfx_build::{BundleOptions, CodegenOptions, EffectBundle, compile_effect};

fn main() {
    let mut args: Vec<String> = env::args().collect();

    let minify = args.iter().any(|arg| arg == "--minify");
    args.retain(|arg| arg != "--minify");

    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <effect.wgfx> [output_dir] [--minify]", args[0]);
        eprintln!("Compiles an effect and dumps the generated modules to stdout,");
        eprintln!("or writes an effect bundle to output_dir if given");
        process::exit(1);
    }

    let effect_path = &args[1];
    if !Path::new(effect_path).exists() {
        eprintln!("Error: Effect file '{effect_path}' does not exist");
        process::exit(1);
    }

    let source = match fs::read_to_string(effect_path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading effect '{effect_path}': {e}");
            process::exit(1);
        }
    };

    let compiled = match compile_effect(&source, &CodegenOptions::default()) {
        Ok(compiled) => compiled,
        Err(e) => {
            eprintln!("Error compiling effect '{effect_path}': {e}");
            process::exit(1);
        }
    };

    let bundle = match EffectBundle::new(&compiled, &BundleOptions { minify }) {
        Ok(bundle) => bundle,
        Err(e) => {
            eprintln!("Error packaging effect '{effect_path}': {e}");
            process::exit(1);
        }
    };

    match args.get(2) {
        Some(output_dir) => {
            if let Err(e) = bundle.write_to_dir(Path::new(output_dir)) {
                eprintln!("Error writing bundle to '{output_dir}': {e}");
                process::exit(1);
            }
            eprintln!("Wrote {} pass(es) to {output_dir}", bundle.sources.len());
        }
        None => {
            for (pass, source) in bundle.manifest.passes.iter().zip(&bundle.sources) {
                println!("// ==== {} (output {}, workgroup {:?}) ====", pass.file, pass.output, pass.workgroup_size);
                println!("{source}");
            }
        }
    }
}
