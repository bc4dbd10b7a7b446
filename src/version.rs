use std::sync::LazyLock;

/// Version of the software as compiled into the binary.
pub static VERSION: LazyLock<String> =
    LazyLock::new(|| env!("CARGO_PKG_VERSION").to_string());
