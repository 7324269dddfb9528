// Build script: Android needs libc++_shared linked explicitly so Oboe's C++
// symbols (e.g. __cxa_pure_virtual) resolve on every ABI. Mirrors the
// teacher's build.rs, which links the same library for the same reason.

fn main() {
    println!("cargo:rerun-if-changed=src/api.rs");

    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }
}
