//! Build script — links `libespeak-ng`.
//!
//! Resolution order:
//!   1. pkg-config — standard desktop discovery
//!   2. bare `-lespeak-ng` — linker searches its default paths
//!
//!   Desktop quick-start:
//!     macOS  :  brew install espeak-ng
//!     Ubuntu :  sudo apt install libespeak-ng-dev
//!     Alpine :  apk add espeak-ng-dev

fn main() {
    if pkg_config::Config::new()
        .atleast_version("1.49")
        .probe("espeak-ng")
        .is_ok()
    {
        // pkg-config emits all necessary rustc-link-* lines itself.
        return;
    }

    // Fallback: let the linker search its default paths.
    println!("cargo:rustc-link-lib=dylib=espeak-ng");
}
