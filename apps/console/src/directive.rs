use anyhow::{bail, Context, Result};
use engine_client::CanvasGeometry;
use shared::{
    domain::RenderTarget,
    protocol::{Command, Request},
};

/// One parsed line of console input.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Submit(Request),
    Target(RenderTarget),
    Geometry(CanvasGeometry),
}

/// Parses a console line; blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<Directive>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    if line.starts_with('/') {
        let command = Command::parse(line).with_context(|| format!("bad command '{line}'"))?;
        return Ok(Some(Directive::Submit(Request::structural(command))));
    }
    let Some(directive) = line.strip_prefix(':') else {
        bail!("expected a /command or :directive, got '{line}'");
    };

    let mut words = directive.split_whitespace();
    let name = words.next().unwrap_or_default();
    let rest: Vec<&str> = words.collect();
    let parsed = match name {
        "move" => {
            let [x, y] = numbers(name, &rest)?;
            Directive::Submit(Request::pointer_move(x, y))
        }
        "pan" => {
            let [x, y] = numbers(name, &rest)?;
            Directive::Submit(Request::pan(x, y))
        }
        "zoom" => {
            let [x, y, factor] = numbers(name, &rest)?;
            Directive::Submit(Request::zoom(x, y, factor))
        }
        "render" => {
            numbers::<0>(name, &rest)?;
            Directive::Submit(Request::render_frame())
        }
        "target" => {
            let [path] = rest[..] else {
                bail!(":target takes one path");
            };
            let target = RenderTarget::try_from(path.to_string())
                .with_context(|| format!("bad target '{path}'"))?;
            Directive::Target(target)
        }
        "geometry" => {
            let [window_id, left, top, width, height, scale] = numbers(name, &rest)?;
            if window_id < 0.0 || window_id.fract() != 0.0 {
                bail!(":geometry window id must be a non-negative integer");
            }
            Directive::Geometry(CanvasGeometry {
                window_id: window_id as u64,
                left,
                top,
                width,
                height,
                scale,
            })
        }
        other => bail!("unknown directive ':{other}'"),
    };
    Ok(Some(parsed))
}

fn numbers<const N: usize>(name: &str, words: &[&str]) -> Result<[f64; N]> {
    if words.len() != N {
        bail!(":{name} takes {N} numbers, got {}", words.len());
    }
    let mut out = [0.0; N];
    for (slot, word) in out.iter_mut().zip(words) {
        *slot = word
            .parse()
            .with_context(|| format!(":{name}: '{word}' is not a number"))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::CommandKind;

    #[test]
    fn skips_blank_and_comment_lines() {
        assert_eq!(parse("   ").expect("blank"), None);
        assert_eq!(parse("# load the model").expect("comment"), None);
    }

    #[test]
    fn raw_commands_become_structural_requests() {
        let Some(Directive::Submit(request)) =
            parse("/minsky/canvas/addOperation \"time\"").expect("parse")
        else {
            panic!("expected a submission");
        };
        let CommandKind::Structural(command) = request.kind else {
            panic!("expected a structural command");
        };
        assert_eq!(command.to_string(), "/minsky/canvas/addOperation \"time\"");
    }

    #[test]
    fn interaction_directives_map_to_coalescible_requests() {
        assert_eq!(
            parse(":move 3 4").expect("move"),
            Some(Directive::Submit(Request::pointer_move(3.0, 4.0)))
        );
        assert_eq!(
            parse(":zoom 10 10 1.1").expect("zoom"),
            Some(Directive::Submit(Request::zoom(10.0, 10.0, 1.1)))
        );
        assert_eq!(
            parse(":render").expect("render"),
            Some(Directive::Submit(Request::render_frame()))
        );
    }

    #[test]
    fn geometry_and_target_directives() {
        let Some(Directive::Geometry(geometry)) =
            parse(":geometry 7 0 20 800 600 1.5").expect("geometry")
        else {
            panic!("expected geometry");
        };
        assert_eq!(geometry.window_id, 7);
        assert!(geometry.is_known());

        let Some(Directive::Target(target)) = parse(":target /minsky/godleyTab").expect("target")
        else {
            panic!("expected target");
        };
        assert_eq!(target.to_string(), "/minsky/godleyTab");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse(":move 1").is_err());
        assert!(parse(":zoom a b c").is_err());
        assert!(parse(":geometry -1 0 0 1 1 1").is_err());
        assert!(parse(":fly").is_err());
        assert!(parse("minsky.canvas").is_err());
        assert!(parse("/minsky/x [1,").is_err());
    }
}
