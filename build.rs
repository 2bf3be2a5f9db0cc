fn main() {
    // The ESP-IDF sysenv is only meaningful for xtensa firmware builds.
    // Host builds (tests, host-node) skip it entirely.
    if let Ok(target) = std::env::var("TARGET") {
        if target.contains("xtensa") {
            embuild::espidf::sysenv::output();
        }
    }
}
