use std::{env, fs::File, io::BufReader};

use anyhow::{bail, Context};
use jfif_meta::JfifImage;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let paths = env::args().skip(1).collect::<Vec<_>>();
    if paths.is_empty() {
        bail!("usage: info <image.jpg>...")
    }

    for path in &paths {
        let file = File::open(path).with_context(|| format!("opening {path}"))?;
        let mut stream = BufReader::new(file);
        let image = JfifImage::from_stream(&mut stream, Vec::<u8>::new(), path.as_str())
            .with_context(|| format!("unsupported or corrupt image {path}"))?;
        println!(
            "{}: {}x{} px, {}x{} dpi",
            image.filename(),
            image.px_width(),
            image.px_height(),
            image.horz_dpi(),
            image.vert_dpi(),
        );
    }

    Ok(())
}
