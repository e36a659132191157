//! Shortcodes: directives embedded in markdown bodies.
//!
//! ```text
//! {{< video "https://youtu.be/dQw4w9WgXcQ" >}}
//!
//! {{< notice tip title="Before you start" >}}
//! Install the toolchain **first**.
//! {{< /notice >}}
//! ```
//!
//! The module is split into:
//! - **Scanner**: pure text → [`Segment`] split, skipping code fences and spans
//! - **Registry**: [`ShortcodeRegistry`] mapping names to typed [`Handler`]s
//! - **Built-ins**: `video`, `toc`, `notice`, `ref`, `relref`

mod builtin;
mod registry;
mod scanner;

pub use registry::{
    BlockFn, Expansion, Handler, InlineFn, RegistryError, ShortcodeError, ShortcodeRegistry,
};
pub use scanner::{Invocation, Segment, ShortcodeSyntaxError, scan, scan_at};
