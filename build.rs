use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

const LIBS: &[&str] = &["tensorflow-lite"];

fn main() -> Result<()> {
    let mut bindings = bindgen::Builder::default()
        .header("wrapper.h")
        .parse_callbacks(Box::new(bindgen::CargoCallbacks))
        .allowlist_function("TfLite.*")
        .allowlist_type("TfLite.*")
        .rustfmt_bindings(true)
        .newtype_enum(".+")
        .derive_debug(true)
        .impl_debug(true)
        .size_t_is_usize(true)
        .opaque_type("max_align_t");

    // probing also emits the cargo:rustc-link-lib lines for each library
    for include_path in LIBS.iter().try_fold(vec![], |mut paths, lib| {
        let library = pkg_config::Config::new()
            .probe(lib)
            .with_context(|| format!("failed to probe pkg-config for {}", lib))?;
        paths.extend(library.include_paths);
        Ok::<_, anyhow::Error>(paths)
    })? {
        bindings = bindings.clang_arg(format!("-I{}", include_path.display()));
    }

    bindings
        .generate()
        .map_err(|_| anyhow!("unable to generate bindings"))?
        .write_to_file(
            PathBuf::from(
                std::env::var("OUT_DIR").context("OUT_DIR environment variable not defined")?,
            )
            .join("bindings.rs"),
        )
        .context("failed to write bindings to file")?;

    println!("cargo:rerun-if-changed=wrapper.h");

    Ok(())
}
