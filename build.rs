use std::env;
use std::path::PathBuf;

/// Points Windows builds at a vcpkg FFmpeg when `FFMPEG_DIR` is unset.
/// Other platforms find FFmpeg through pkg-config in `ffmpeg-sys-next`.
fn main() {
    for variable in ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "windows" || env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=reframe needs FFmpeg with libswscale and an H.264/H.265 encoder; set FFMPEG_DIR or VCPKG_ROOT"
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let ffmpeg_dir = PathBuf::from(vcpkg_root).join("installed").join(triplet);
    if ffmpeg_dir.join("include").join("libswscale").exists() {
        println!(
            "cargo:warning=using vcpkg FFmpeg at {0}; set FFMPEG_DIR={0} to silence this",
            ffmpeg_dir.display()
        );
    } else {
        println!(
            "cargo:warning=no FFmpeg with libswscale under {}",
            ffmpeg_dir.display()
        );
    }
}
