use std::fmt;

use serde_json::Value;

use crate::{
    domain::{Address, Segment},
    error::{AddressError, WireError},
    wire,
};

/// A single engine invocation: `<path> <argEncoding>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub target: Address,
    /// `None` addresses the bare path (a property read or bulk write).
    pub method: Option<String>,
    pub args: Vec<Value>,
}

impl Command {
    pub fn new(target: Address, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            target,
            method: Some(method.into()),
            args,
        }
    }

    pub fn bare(target: Address, args: Vec<Value>) -> Self {
        Self {
            target,
            method: None,
            args,
        }
    }

    /// Parses console-style input such as `/minsky/canvas/zoom [1,2,1.1]`.
    ///
    /// The argument text is kept as a single pre-encoded value so it reaches the
    /// engine exactly as written.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let (path, arg) = split_command_line(line.trim());
        let target = Address::parse(path)?;
        let args = if arg.is_empty() {
            Vec::new()
        } else {
            vec![wire::decode(arg)?]
        };
        Ok(Self::bare(target, args))
    }

    /// Full path including the method, as sent on the wire.
    pub fn path(&self) -> Address {
        match &self.method {
            Some(method) => self.target.field(method.clone()),
            None => self.target.clone(),
        }
    }

    pub fn encoded_args(&self) -> String {
        wire::encode_args(&self.args)
    }

    /// Last named step of the path, used for log filtering and classification.
    pub fn name(&self) -> Option<&str> {
        self.method.as_deref().or_else(|| self.target.last_field())
    }

    pub fn is_collection_op(&self) -> bool {
        self.method.is_none() && self.target.segments().last().is_some_and(Segment::is_pseudo)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self.encoded_args();
        if args.is_empty() {
            write!(f, "{}", self.path())
        } else {
            write!(f, "{} {}", self.path(), args)
        }
    }
}

/// Splits at the first whitespace outside a quoted key.
fn split_command_line(line: &str) -> (&str, &str) {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (at, c) in line.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => return (&line[..at], line[at..].trim()),
            None => {}
        }
    }
    (line, "")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("invalid path: {0}")]
    Path(#[from] AddressError),
    #[error("invalid arguments: {0}")]
    Args(#[from] WireError),
}

/// High-frequency interactions whose pending submissions are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoalescingClass {
    PointerMove,
    Pan,
    Zoom,
}

impl CoalescingClass {
    pub const ALL: [Self; 3] = [Self::PointerMove, Self::Pan, Self::Zoom];

    pub fn index(self) -> usize {
        match self {
            Self::PointerMove => 0,
            Self::Pan => 1,
            Self::Zoom => 2,
        }
    }
}

/// What a UI action asks the engine to do. The tag decides coalescing.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    PointerMove { x: f64, y: f64 },
    Pan { x: f64, y: f64 },
    Zoom { x: f64, y: f64, factor: f64 },
    /// Explicit render of the active target.
    RenderFrame,
    Structural(Command),
}

impl CommandKind {
    pub fn coalescing_class(&self) -> Option<CoalescingClass> {
        match self {
            Self::PointerMove { .. } => Some(CoalescingClass::PointerMove),
            Self::Pan { .. } => Some(CoalescingClass::Pan),
            Self::Zoom { .. } => Some(CoalescingClass::Zoom),
            Self::RenderFrame | Self::Structural(_) => None,
        }
    }

    /// Folds a later submission of the same class into this one.
    ///
    /// Positions are replaced; zoom factors compound. Returns `false` and
    /// leaves `self` untouched when the kinds differ.
    pub fn merge(&mut self, later: &CommandKind) -> bool {
        match (self, later) {
            (Self::PointerMove { x, y }, Self::PointerMove { x: nx, y: ny })
            | (Self::Pan { x, y }, Self::Pan { x: nx, y: ny }) => {
                *x = *nx;
                *y = *ny;
                true
            }
            (
                Self::Zoom { x, y, factor },
                Self::Zoom {
                    x: nx,
                    y: ny,
                    factor: nf,
                },
            ) => {
                *x = *nx;
                *y = *ny;
                *factor *= *nf;
                true
            }
            _ => false,
        }
    }

    /// Resolves the engine command for `target`, or `None` for a render frame,
    /// which the render scheduler builds itself.
    pub fn to_command(&self, target: &Address) -> Option<Command> {
        match self {
            Self::PointerMove { x, y } => {
                Some(Command::new(target.clone(), "mouseMove", vec![(*x).into(), (*y).into()]))
            }
            Self::Pan { x, y } => {
                Some(Command::new(target.clone(), "moveTo", vec![(*x).into(), (*y).into()]))
            }
            Self::Zoom { x, y, factor } => Some(Command::new(
                target.clone(),
                "zoom",
                vec![(*x).into(), (*y).into(), (*factor).into()],
            )),
            Self::RenderFrame => None,
            Self::Structural(command) => Some(command.clone()),
        }
    }
}

/// A queued unit of UI work.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub kind: CommandKind,
    /// Render the active target after this command completes.
    pub render: bool,
    /// Mark the view stale before executing, forcing the next render.
    pub invalidate: bool,
}

impl Request {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            render: true,
            invalidate: false,
        }
    }

    pub fn pointer_move(x: f64, y: f64) -> Self {
        Self::new(CommandKind::PointerMove { x, y })
    }

    pub fn pan(x: f64, y: f64) -> Self {
        Self::new(CommandKind::Pan { x, y })
    }

    pub fn zoom(x: f64, y: f64, factor: f64) -> Self {
        Self::new(CommandKind::Zoom { x, y, factor })
    }

    pub fn render_frame() -> Self {
        Self::new(CommandKind::RenderFrame)
    }

    pub fn structural(command: Command) -> Self {
        Self::new(CommandKind::Structural(command))
    }

    pub fn without_render(mut self) -> Self {
        self.render = false;
        self
    }

    pub fn invalidating(mut self) -> Self {
        self.invalidate = true;
        self
    }

    pub fn coalescing_class(&self) -> Option<CoalescingClass> {
        self.kind.coalescing_class()
    }

    pub fn merge(&mut self, later: &Request) -> bool {
        if !self.kind.merge(&later.kind) {
            return false;
        }
        self.render |= later.render;
        self.invalidate |= later.invalidate;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canvas() -> Address {
        Address::parse("/minsky/canvas").expect("canvas address")
    }

    #[test]
    fn command_display_matches_wire_form() {
        let cmd = Command::new(canvas(), "zoom", vec![json!(10), json!(10), json!(1.1)]);
        assert_eq!(cmd.to_string(), "/minsky/canvas/zoom [10,10,1.1]");
        assert_eq!(Command::bare(canvas(), vec![]).to_string(), "/minsky/canvas");
        assert_eq!(cmd.name(), Some("zoom"));
    }

    #[test]
    fn parses_console_lines() {
        let cmd = Command::parse("/minsky/canvas/addOperation \"time\"").expect("parse");
        assert_eq!(cmd.path().to_string(), "/minsky/canvas/addOperation");
        assert_eq!(cmd.encoded_args(), "\"time\"");

        let bulk = Command::parse("/minsky/canvas/mouseUp [100, 200]").expect("parse");
        assert_eq!(bulk.encoded_args(), "[100,200]");

        let bare = Command::parse("minsky.model.items.@size").expect("parse");
        assert!(bare.args.is_empty());
        assert!(bare.is_collection_op());
        assert_eq!(bare.to_string(), "/minsky/model/items/@size");

        assert!(matches!(
            Command::parse("/minsky/x [1,"),
            Err(CommandParseError::Args(_))
        ));
    }

    #[test]
    fn quoted_keys_may_contain_spaces() {
        let read = Command::parse("/minsky/namedItems/@elem/\"a b\"/second").expect("parse");
        assert!(read.args.is_empty());
        assert_eq!(read.path().to_string(), "/minsky/namedItems/@elem/\"a b\"/second");

        let write = Command::parse("/minsky/namedItems/@elem/'x \\' y'/second/name \"z\"")
            .expect("parse with argument");
        assert_eq!(write.path().to_string(), "/minsky/namedItems/@elem/\"x ' y\"/second/name");
        assert_eq!(write.encoded_args(), "\"z\"");
    }

    #[test]
    fn moves_overwrite_and_zoom_compounds() {
        let mut moved = Request::pointer_move(0.0, 0.0);
        assert!(moved.merge(&Request::pointer_move(4.0, 4.0)));
        assert_eq!(moved.kind, CommandKind::PointerMove { x: 4.0, y: 4.0 });

        let mut zoom = Request::zoom(10.0, 10.0, 1.1);
        assert!(zoom.merge(&Request::zoom(12.0, 12.0, 1.1)));
        let CommandKind::Zoom { x, y, factor } = zoom.kind else {
            panic!("zoom kind changed");
        };
        assert_eq!((x, y), (12.0, 12.0));
        assert!((factor - 1.21).abs() < 1e-9);
    }

    #[test]
    fn merge_refuses_mismatched_kinds() {
        let mut pan = Request::pan(1.0, 1.0);
        assert!(!pan.merge(&Request::pointer_move(2.0, 2.0)));
        assert_eq!(pan.kind, CommandKind::Pan { x: 1.0, y: 1.0 });
    }

    #[test]
    fn kinds_resolve_against_the_target() {
        let target = canvas();
        assert_eq!(
            CommandKind::PointerMove { x: 1.0, y: 2.0 }
                .to_command(&target)
                .expect("command")
                .to_string(),
            "/minsky/canvas/mouseMove [1.0,2.0]"
        );
        assert_eq!(
            CommandKind::Pan { x: 3.0, y: 4.0 }
                .to_command(&target)
                .expect("command")
                .to_string(),
            "/minsky/canvas/moveTo [3.0,4.0]"
        );
        assert!(CommandKind::RenderFrame.to_command(&target).is_none());
    }
}
