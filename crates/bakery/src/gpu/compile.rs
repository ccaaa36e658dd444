//! GLSL normalisation ahead of compilation.
//!
//! Baking shaders are written in desktop-GL style: loose `uniform` globals,
//! `in`/`out` declarations without locations and whatever `#version` the
//! author had at hand. The wgpu GLSL front end wants Vulkan-flavoured 450
//! source, so each program is rewritten before it reaches the device:
//!
//! 1. `#version` lines are blanked and a `#version 450` header is prepended.
//! 2. Loose uniforms of supported types are removed from both stages and
//!    redeclared in one std140 block at set 0 / binding 0. Booleans become
//!    `uint` members aliased back through a macro.
//! 3. Vertex inputs get the quad mesh's attribute locations, varyings get
//!    locations by sorted name, fragment outputs by declaration order.
//!
//! Removed lines are replaced with blank lines and the header ends in
//! `#line 1`, so compiler diagnostics keep the author's line numbers.
use std::collections::BTreeSet;

use super::uniforms::{UniformKind, UniformLayout};

/// Identifier reported for the built-in vertex stage.
pub const BUILTIN_VERTEX_ID: &str = "builtin:quad.vs";

/// Pass-through vertex shader used when a job does not name one.
pub const BUILTIN_VERTEX_SHADER: &str = r"#version 330
in vec3 in_verts;
in vec2 in_uvs;
out vec2 v_uv;

void main() {
    v_uv = in_uvs;
    gl_Position = vec4(in_verts, 1.0);
}
";

/// Vertex attributes provided by the baking quad, in location order.
pub(crate) const QUAD_ATTRIBUTES: [&str; 2] = ["in_verts", "in_uvs"];

const BOOL_MEMBER_PREFIX: &str = "bake_flag_";

#[derive(Debug, Clone)]
pub(crate) struct PreparedProgram {
    pub vertex: String,
    pub fragment: String,
    pub uniforms: UniformLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

#[derive(Debug)]
struct Interface<'a> {
    qualifier: &'a str,
    direction: Direction,
    ty: &'a str,
    name: &'a str,
}

enum Line<'a> {
    Version,
    Uniforms(Vec<(&'a str, UniformKind)>),
    Interface(Interface<'a>),
    Other(&'a str),
}

/// Rewrites a vertex/fragment pair into Vulkan GLSL 450 sharing one uniform
/// block.
pub(crate) fn prepare_render(vertex: &str, fragment: &str) -> Result<PreparedProgram, String> {
    let vertex_lines: Vec<Line<'_>> = vertex.lines().map(classify).collect();
    let fragment_lines: Vec<Line<'_>> = fragment.lines().map(classify).collect();

    let mut fields: Vec<(&str, UniformKind)> = Vec::new();
    for line in vertex_lines.iter().chain(fragment_lines.iter()) {
        if let Line::Uniforms(declared) = line {
            for &(name, kind) in declared {
                match fields.iter().find(|(existing, _)| *existing == name) {
                    Some((_, existing_kind)) if *existing_kind != kind => {
                        return Err(format!(
                            "uniform '{name}' is declared as both {} and {}",
                            existing_kind.block_type(),
                            kind.block_type()
                        ));
                    }
                    Some(_) => {}
                    None => fields.push((name, kind)),
                }
            }
        }
    }
    let uniforms = UniformLayout::std140(fields.iter().copied());

    let varyings: BTreeSet<&str> = vertex_lines
        .iter()
        .filter_map(|line| match line {
            Line::Interface(iface) if iface.direction == Direction::Out => Some(iface.name),
            _ => None,
        })
        .chain(fragment_lines.iter().filter_map(|line| match line {
            Line::Interface(iface) if iface.direction == Direction::In => Some(iface.name),
            _ => None,
        }))
        .collect();
    let varying_location = |name: &str| {
        varyings
            .iter()
            .position(|candidate| *candidate == name)
            .unwrap_or_default()
    };

    let header = header(&uniforms);
    let mut vertex_out = header.clone();
    for line in &vertex_lines {
        match line {
            Line::Interface(iface) if iface.direction == Direction::In => {
                let location = QUAD_ATTRIBUTES
                    .iter()
                    .position(|attribute| *attribute == iface.name)
                    .ok_or_else(|| {
                        format!(
                            "unsupported vertex attribute '{}' (the baking quad provides {})",
                            iface.name,
                            QUAD_ATTRIBUTES.join(", ")
                        )
                    })?;
                push_interface(&mut vertex_out, iface, location);
            }
            Line::Interface(iface) => {
                push_interface(&mut vertex_out, iface, varying_location(iface.name));
            }
            other => push_plain(&mut vertex_out, other),
        }
    }

    let mut fragment_out = header;
    let mut next_output = 0usize;
    for line in &fragment_lines {
        match line {
            Line::Interface(iface) if iface.direction == Direction::In => {
                push_interface(&mut fragment_out, iface, varying_location(iface.name));
            }
            Line::Interface(iface) => {
                push_interface(&mut fragment_out, iface, next_output);
                next_output += 1;
            }
            other => push_plain(&mut fragment_out, other),
        }
    }

    Ok(PreparedProgram {
        vertex: vertex_out,
        fragment: fragment_out,
        uniforms,
    })
}

/// Compute shaders only need their version pinned; bindings are explicit.
pub(crate) fn prepare_compute(source: &str) -> String {
    let mut out = String::from("#version 450\n#line 1\n");
    for line in source.lines() {
        if !is_version(line) {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

fn header(uniforms: &UniformLayout) -> String {
    let mut header = String::from("#version 450\n");
    if !uniforms.is_empty() {
        header.push_str("layout(std140, set = 0, binding = 0) uniform BakeParams {\n");
        for (name, kind) in uniforms.fields() {
            let member = match kind {
                UniformKind::Bool => format!("{BOOL_MEMBER_PREFIX}{name}"),
                _ => name.to_owned(),
            };
            header.push_str(&format!("    {} {member};\n", kind.block_type()));
        }
        header.push_str("};\n");
        for (name, kind) in uniforms.fields() {
            if kind == UniformKind::Bool {
                header.push_str(&format!(
                    "#define {name} ({BOOL_MEMBER_PREFIX}{name} != 0u)\n"
                ));
            }
        }
    }
    header.push_str("#line 1\n");
    header
}

fn push_interface(out: &mut String, iface: &Interface<'_>, location: usize) {
    out.push_str(&format!("layout(location = {location}) "));
    if !iface.qualifier.is_empty() {
        out.push_str(iface.qualifier);
        out.push(' ');
    }
    let keyword = match iface.direction {
        Direction::In => "in",
        Direction::Out => "out",
    };
    out.push_str(&format!("{keyword} {} {};\n", iface.ty, iface.name));
}

fn push_plain(out: &mut String, line: &Line<'_>) {
    if let Line::Other(text) = line {
        out.push_str(text);
    }
    out.push('\n');
}

fn classify(line: &str) -> Line<'_> {
    if is_version(line) {
        Line::Version
    } else if let Some(uniforms) = parse_uniforms(line) {
        Line::Uniforms(uniforms)
    } else if let Some(iface) = parse_interface(line) {
        Line::Interface(iface)
    } else {
        Line::Other(line)
    }
}

fn is_version(line: &str) -> bool {
    line.trim_start().starts_with("#version")
}

fn strip_precision(rest: &str) -> &str {
    for precision in ["lowp ", "mediump ", "highp "] {
        if let Some(stripped) = rest.strip_prefix(precision) {
            return stripped.trim_start();
        }
    }
    rest
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(ch) if ch.is_ascii_alphabetic() || ch == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// `uniform [precision] <type> a[, b...];` with a hoistable type.
fn parse_uniforms(line: &str) -> Option<Vec<(&str, UniformKind)>> {
    let body = line.trim().strip_prefix("uniform ")?.strip_suffix(';')?;
    let body = strip_precision(body.trim_start());
    let (ty, names) = body.split_once(char::is_whitespace)?;
    let kind = UniformKind::from_glsl(ty)?;
    let names: Vec<&str> = names.split(',').map(str::trim).collect();
    if names.iter().all(|name| is_identifier(name)) {
        Some(names.into_iter().map(|name| (name, kind)).collect())
    } else {
        None
    }
}

/// `[flat|smooth|noperspective] in|out [precision] <type> <name>;`
/// without an explicit layout qualifier.
fn parse_interface(line: &str) -> Option<Interface<'_>> {
    let body = line.trim().strip_suffix(';')?.trim_end();
    let (qualifier, body) = ["flat ", "smooth ", "noperspective "]
        .iter()
        .find_map(|q| body.strip_prefix(q).map(|rest| (q.trim_end(), rest.trim_start())))
        .unwrap_or(("", body));
    let (direction, body) = if let Some(rest) = body.strip_prefix("in ") {
        (Direction::In, rest)
    } else if let Some(rest) = body.strip_prefix("out ") {
        (Direction::Out, rest)
    } else {
        return None;
    };
    let body = strip_precision(body.trim_start());
    let (ty, name) = body.split_once(char::is_whitespace)?;
    let name = name.trim();
    if is_identifier(ty) && is_identifier(name) {
        Some(Interface {
            qualifier,
            direction,
            ty,
            name,
        })
    } else {
        None
    }
}
