//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Once;

use tracing_subscriber::EnvFilter;

// ===== macros =====

/// Byte-slice equality assertion that reports both sides as hex dumps.
#[macro_export]
macro_rules! assert_eq_hex {
    ($left:expr, $right:expr) => {
        match (&$left, &$right) {
            (left, right) => {
                let left = AsRef::<[u8]>::as_ref(left);
                let right = AsRef::<[u8]>::as_ref(right);
                if left != right {
                    panic!(
                        "byte mismatch\n  left: {}\n right: {}",
                        $crate::testing::hex_dump(left),
                        $crate::testing::hex_dump(right),
                    );
                }
            }
        }
    };
}

// ===== global functions =====

// Formats bytes as space-separated hex pairs.
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// Installs a test-friendly tracing subscriber. `RUST_LOG` overrides the
// default "debug" filter. Repeated calls are no-ops.
pub fn setup() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_test_writer()
            .try_init();
    });
}

// ===== unit tests =====
