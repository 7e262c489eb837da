fn main() {
    let revision = match grev::git_revision_auto(".") {
        Ok(Some(revision)) => revision,
        _ => "unknown".to_string(),
    };
    println!("cargo:rustc-env=GIT_REVISION={revision}");
}
