/*
Purpose: Link the Node binding against liblmdb_proxy.
Exports: None (build script only).
Role: Resolve the liblmdb_proxy search path for the N-API addon.
Invariants: Uses LMPX_LIB_DIR or repo-local target/ outputs.
Notes: Fails fast when liblmdb_proxy cannot be located.
*/

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=LMPX_LIB_DIR");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let repo_root = crate_dir
        .parent()
        .and_then(|path| path.parent())
        .and_then(|path| path.parent())
        .expect("bindings/node/native should be three levels below repo root")
        .to_path_buf();

    let lib_dir = env::var("LMPX_LIB_DIR")
        .ok()
        .map(PathBuf::from)
        .into_iter()
        .chain([
            repo_root.join("target").join("debug"),
            repo_root.join("target").join("release"),
        ])
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| {
            panic!("liblmdb_proxy not found; set LMPX_LIB_DIR or build target/debug/liblmdb_proxy.*")
        });

    println!("cargo:rustc-link-search=native={}", lib_dir.display());
    println!("cargo:rustc-link-lib=lmdb_proxy");
}
