fn main() {
    // The linker script only applies to the freestanding kernel image.
    // Hosted builds (cargo test on the developer machine) link normally.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "none" {
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
        println!("cargo:rustc-link-arg=-T{}/link.ld", manifest_dir);
        println!("cargo:rerun-if-changed=link.ld");
    }
}
