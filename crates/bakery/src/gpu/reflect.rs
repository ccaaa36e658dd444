use wgpu::naga;

/// Storage buffer declared by a compute shader in bind group 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StorageBinding {
    pub slot: u32,
    pub read_only: bool,
}

/// Parses a prepared GLSL stage, returning a readable diagnostic on failure.
pub(crate) fn parse_stage(source: &str, stage: naga::ShaderStage) -> Result<naga::Module, String> {
    let mut frontend = naga::front::glsl::Frontend::default();
    frontend
        .parse(&naga::front::glsl::Options::from(stage), source)
        .map_err(|errors| errors.emit_to_string(source))
}

/// Lists the storage buffers of group 0, sorted by slot.
pub(crate) fn storage_bindings(module: &naga::Module) -> Vec<StorageBinding> {
    let mut bindings: Vec<StorageBinding> = module
        .global_variables
        .iter()
        .filter_map(|(_, variable)| {
            let binding = variable.binding.as_ref()?;
            if binding.group != 0 {
                return None;
            }
            match variable.space {
                naga::AddressSpace::Storage { access } => Some(StorageBinding {
                    slot: binding.binding,
                    read_only: !access.contains(naga::StorageAccess::STORE),
                }),
                _ => None,
            }
        })
        .collect();
    bindings.sort_by_key(|binding| binding.slot);
    bindings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::compile::prepare_compute;

    #[test]
    fn finds_storage_slots_and_access() {
        let source = prepare_compute(
            r"#version 430
layout(local_size_x = 64) in;
layout(std430, binding = 1) buffer Output { vec4 out_data[]; };
layout(std430, binding = 0) readonly buffer Input { vec4 in_data[]; };
void main() {
    uint i = gl_GlobalInvocationID.x;
    out_data[i] = in_data[i];
}
",
        );
        let module = parse_stage(&source, naga::ShaderStage::Compute).expect("parse");
        assert_eq!(
            storage_bindings(&module),
            vec![
                StorageBinding {
                    slot: 0,
                    read_only: true
                },
                StorageBinding {
                    slot: 1,
                    read_only: false
                },
            ]
        );
    }

    #[test]
    fn parse_errors_are_reported_as_text() {
        let source = prepare_compute("layout(local_size_x = 1) in;\nvoid main() { undefined_call(); }");
        let err = parse_stage(&source, naga::ShaderStage::Compute).unwrap_err();
        assert!(!err.is_empty());
    }
}
