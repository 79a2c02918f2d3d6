mod cli;

use std::fs::File;
use std::io;
use std::io::BufRead;
use std::io::BufReader;

use clap::Parser;
use cli::Cli;
use ramfs::RamDisk;
use ramfs_shell::Shell;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let disk = RamDisk::with_geometry(cli.blocks, cli.inode_blocks);
    log::info!("ramdisk ready: {:?}", disk.usage());
    let mut shell = Shell::new(disk, cli.pid);

    let script: Box<dyn BufRead> = match &cli.script {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };

    for line in script.lines() {
        if let Some(output) = shell.run_line(&line?) {
            println!("{output}");
        }
    }

    Ok(())
}
