//! List commands implementation

use crate::registry;

/// List all compiled-in backends
pub fn list_backends() {
    print!("{}", registry::backend_help());
    println!();
    println!("Usage: -b <name>[:key=value,...]");
    println!("Common options: dev=<path>, speed=<Hz>, spispeed=<kHz>, mode=<0-3>, order=msb|lsb");
}
