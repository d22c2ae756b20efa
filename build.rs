use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

// Fingerprint of everything under static/, exposed as STATIC_HASH so the
// layout can append `?v=...` to asset URLs.
fn main() {
    println!("cargo:rerun-if-changed=static/");

    let mut hasher = DefaultHasher::new();
    hash_dir(Path::new("static"), &mut hasher);

    let hash = format!("{:016x}", hasher.finish());
    println!("cargo:rustc-env=STATIC_HASH={}", &hash[..8]);
}

fn hash_dir(dir: &Path, hasher: &mut DefaultHasher) {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return;
    };

    let mut assets: Vec<_> = read_dir.filter_map(|e| e.ok()).collect();
    assets.sort_by_key(|e| e.file_name());

    for asset in assets {
        let path = asset.path();
        if path.is_dir() {
            hash_dir(&path, hasher);
        } else if let Ok(contents) = fs::read(&path) {
            path.to_string_lossy().hash(hasher);
            contents.hash(hasher);
        }
    }
}
