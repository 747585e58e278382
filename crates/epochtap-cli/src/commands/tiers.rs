use epochtap_core::format::render_tier_table;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_tier_table());
    Ok(())
}
