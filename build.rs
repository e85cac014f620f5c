fn main() {
    println!("cargo:rerun-if-changed=config/agent.json");

    // ESP-IDF environment is only needed for the firmware build.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
