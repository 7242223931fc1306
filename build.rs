//! Build script for imds-redirect
//!
//! Handles compile-time configuration for distro packagers and embeds
//! build-time information (git commit, dirty status, build timestamp).

fn main() {
    // Re-run build if the packager-provided nft path changes
    println!("cargo:rerun-if-env-changed=IMDS_REDIRECT_SYSTEM_NFT_PATH");

    // Embed git commit, build time, and dirty status
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
