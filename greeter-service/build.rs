use prost::Message;
use std::env::var;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Name of the folder containing the proto definitions
    let proto_folder = "proto";
    let out_dir = PathBuf::from(var("OUT_DIR")?);

    // Bundles land in OUT_DIR, where `tonic::include_file_descriptor_set!` reads them.
    let helloworld = protox::compile(["proto/helloworld/greeter.proto"], [proto_folder])?;
    std::fs::write(
        out_dir.join("helloworld_descriptors.bin"),
        helloworld.encode_to_vec(),
    )?;

    let shop = protox::compile(
        ["proto/shop/order.proto", "proto/shop/coupon.proto"],
        [proto_folder],
    )?;
    std::fs::write(out_dir.join("shop_descriptors.bin"), shop.encode_to_vec())?;

    let demo = protox::compile(["proto/demo/greeting.proto"], [proto_folder])?;
    std::fs::write(out_dir.join("demo_descriptors.bin"), demo.encode_to_vec())?;

    tonic_prost_build::configure()
        .build_client(false)
        .compile_fds(helloworld)?;

    println!("cargo:rerun-if-changed={proto_folder}");

    Ok(())
}
