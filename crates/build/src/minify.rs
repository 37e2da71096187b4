//! Offline WGSL validation and minification
//!
//! Generated modules are checked with `naga` before they are written to a bundle,
//! so a broken effect fails at packaging time instead of on the user's device.

use crate::error::CompileError;

fn parse(pass: u32, shader: &str) -> Result<naga::Module, CompileError> {
    naga::front::wgsl::parse_str(shader).map_err(|e| CompileError::Validation {
        pass,
        message: e.emit_to_string(shader),
    })
}

fn validate(pass: u32, shader: &str, module: &naga::Module) -> Result<naga::valid::ModuleInfo, CompileError> {
    let mut validator = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
    validator.validate(module).map_err(|e| CompileError::Validation {
        pass,
        message: e.emit_to_string(shader),
    })
}

/// Parses and validates a generated module
///
/// # Arguments
/// * `pass` - Pass the module belongs to, used in the error
/// * `shader` - WGSL source
pub fn validate_wgsl(pass: u32, shader: &str) -> Result<(), CompileError> {
    let module = parse(pass, shader)?;
    validate(pass, shader, &module)?;
    Ok(())
}

/// Minifies a generated module to reduce bundle size
///
/// The module is parsed, validated, renamed by `wgsl_minifier` and written back
/// out by naga's WGSL backend. Entry points and bound globals keep their names.
///
/// # Returns
/// The minified WGSL source
pub fn minify_wgsl(pass: u32, shader: &str) -> Result<String, CompileError> {
    let mut module = parse(pass, shader)?;
    wgsl_minifier::minify_module(&mut module);

    let info = validate(pass, shader, &module)?;
    let output = naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty()).map_err(|e| CompileError::Validation { pass, message: e.to_string() })?;

    Ok(wgsl_minifier::minify_wgsl_source(&output))
}
