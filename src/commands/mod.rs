pub mod add;
pub mod cherrypick;
pub mod compare;
pub mod info;
pub mod notify;
pub mod render;
pub mod serve;

/// Bare paths are read as files; anything else must be a `scheme://` descriptor.
pub fn source_descriptor(arg: &str) -> String {
    if arg.contains("://") {
        arg.to_string()
    } else {
        format!("file://{arg}")
    }
}
