fn main() {
    let has_registry = cfg!(feature = "mono") || cfg!(feature = "team");
    if !has_registry {
        panic!(
            "dispatchd requires at least one of the \"mono\" or \"team\" features.\n\
             Example: cargo build --features mono"
        );
    }

    println!("cargo:rerun-if-changed=build.rs");
}
