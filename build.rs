use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");
    println!("cargo:rerun-if-env-changed=VCPKG_ROOT");
    println!("cargo:rerun-if-env-changed=VCPKGRS_TRIPLET");

    // The stub-backed build links nothing native.
    if env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }

    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows"
        || env::var_os("FFMPEG_DIR").is_some()
    {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=frameseek: FFMPEG_DIR is not set. Point it at an FFmpeg install (for example a vcpkg triplet directory) or build with --no-default-features."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let candidate = PathBuf::from(vcpkg_root).join("installed").join(triplet);
    if candidate.join("include").join("libavcodec").exists() {
        println!(
            "cargo:warning=frameseek: found vcpkg FFmpeg at {0}; set FFMPEG_DIR={0} to use it.",
            candidate.display()
        );
    } else {
        println!(
            "cargo:warning=frameseek: VCPKG_ROOT is set but {} has no FFmpeg headers.",
            candidate.display()
        );
    }
}
