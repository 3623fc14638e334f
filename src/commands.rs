//! Command implementations
use fatimg_storage::{
    dev::ImageFile,
    fat::{FatError, FatFs, fat::FatEntries},
};
use std::{io::Write, path::Path};

/// A command result
pub type CommandResult = Result<(), String>;

/// Returns the usage text
pub fn usage(executable: &str) -> String {
    format!(
        "Usage:\n  \
            {executable} -h | --help             - Display this help text\n  \
            {executable} ls <image>              - List the files of the root directory\n  \
            {executable} cat <file> <image>      - Print the contents of a file\n  \
            {executable} cp <src> <dst> <image>  - Copy a file inside the image\n  \
            {executable} mv <src> <dst> <image>  - Rename a file\n  \
            {executable} rm <file> <image>       - Remove a file\n  \
            {executable} info <image>            - Display the volume geometry\n\
        \n\
        <image> needs to be a valid FAT32 image. Only the root directory is supported.\n\
        Set {}=debug to trace what the tool does.\n",
        crate::logging::LEVEL_ENV_VAR
    )
}

/// Execute a command on the image at `image`
///
/// Output goes to `out`; errors come back as a message for the user.
pub fn execute_command<W: Write>(
    command: &str,
    args: &[String],
    image: &Path,
    out: &mut W,
) -> CommandResult {
    match command {
        "ls" => {
            let [] = expect_args::<0>(command, args)?;
            cmd_ls(&mut mount(image, false)?, out)
        }
        "info" => {
            let [] = expect_args::<0>(command, args)?;
            cmd_info(&mut mount(image, false)?, out)
        }
        "cat" => {
            let [file] = expect_args::<1>(command, args)?;
            cmd_cat(&mut mount(image, false)?, file, out)
        }
        "cp" => {
            let [source, dest] = expect_args::<2>(command, args)?;
            let mut fs = mount(image, true)?;
            let clusters = fs.copy(source, dest).map_err(fat_error(source))?;
            log::info!("Copied {source} to {dest} in {clusters} clusters");
            unmount(fs)
        }
        "mv" => {
            let [source, dest] = expect_args::<2>(command, args)?;
            let mut fs = mount(image, true)?;
            fs.rename(source, dest).map_err(fat_error(source))?;
            unmount(fs)
        }
        "rm" => {
            let [file] = expect_args::<1>(command, args)?;
            let mut fs = mount(image, true)?;
            fs.remove(file).map_err(fat_error(file))?;
            unmount(fs)
        }
        _ => Err(format!("Unknown command: {command}")),
    }
}

fn expect_args<'a, const N: usize>(
    command: &str,
    args: &'a [String],
) -> Result<&'a [String; N], String> {
    <&[String; N]>::try_from(args).map_err(|_| {
        format!(
            "{command} expects {N} argument(s) before the image path, got {}",
            args.len()
        )
    })
}

fn fat_error(subject: &str) -> impl FnOnce(FatError) -> String + '_ {
    move |err| format!("{subject}: {err}")
}

fn io_error(err: &std::io::Error) -> String {
    format!("Could not write output: {err}")
}

fn mount(image: &Path, writable: bool) -> Result<FatFs<ImageFile>, String> {
    let device = if writable {
        ImageFile::open(image)
    } else {
        ImageFile::open_read_only(image)
    }
    .map_err(|err| format!("Could not open {}: {err}", image.display()))?;

    FatFs::new(device).map_err(|err| format!("{}: {err}", image.display()))
}

fn unmount(fs: FatFs<ImageFile>) -> CommandResult {
    fs.into_inner()
        .sync()
        .map_err(|err| format!("Could not flush the image: {err}"))
}

/// List the root directory
fn cmd_ls<W: Write>(fs: &mut FatFs<ImageFile>, out: &mut W) -> CommandResult {
    let entries = fs.list().map_err(fat_error("/"))?;

    writeln!(out, "ATTR  NAME              SIZE  CLUSTER").map_err(|e| io_error(&e))?;
    for entry in entries {
        writeln!(
            out,
            "{:#04x}  {:<12}  {:>10}  {:#x}",
            entry.attributes().bits(),
            entry.name().to_string(),
            entry.file_size(),
            entry.first_cluster().value()
        )
        .map_err(|e| io_error(&e))?;
    }

    Ok(())
}

/// Print the contents of a file
fn cmd_cat<W: Write>(fs: &mut FatFs<ImageFile>, file: &str, out: &mut W) -> CommandResult {
    for chunk in fs.read_contents(file).map_err(fat_error(file))? {
        let chunk = chunk.map_err(fat_error(file))?;
        out.write_all(&chunk).map_err(|e| io_error(&e))?;
    }
    out.flush().map_err(|e| io_error(&e))
}

/// Display the volume geometry
fn cmd_info<W: Write>(fs: &mut FatFs<ImageFile>, out: &mut W) -> CommandResult {
    let free = fs.free_clusters().map_err(fat_error("FAT"))?;
    let bs = fs.boot_sector();
    let layout = fs.layout();

    let info = format!(
        "OEM ID: {}\n\
        Volume ID: {:#010x}\n\
        Volume label: {}\n\
        File system type: {}\n\
        Bytes per sector: {}\n\
        Sectors per cluster: {}\n\
        Reserved sectors: {}\n\
        Number of FATs: {}\n\
        Total sectors: {}\n\
        Sectors per FAT: {}\n\
        Media descriptor: {:#04x}\n\
        Root directory cluster: {}\n\
        File system info sector: {}\n\
        Backup boot sector: {}\n\
        FAT address: {:#x}\n\
        Data address: {:#x}\n\
        Cluster size: {} bytes\n\
        Data clusters: {}\n\
        Addressable clusters: {}\n\
        Free clusters: {free}\n",
        String::from_utf8_lossy(&bs.oem_id()).trim_end(),
        bs.volume_id(),
        String::from_utf8_lossy(&bs.volume_label()).trim_end(),
        String::from_utf8_lossy(&bs.fs_type()).trim_end(),
        bs.bytes_per_sector(),
        bs.sectors_per_cluster(),
        bs.reserved_sectors(),
        bs.fat_count(),
        bs.total_sectors(),
        bs.sectors_per_fat(),
        bs.media_descriptor(),
        bs.root_cluster(),
        bs.fs_info_sector(),
        bs.backup_boot_sector(),
        layout.fat_region_offset(),
        layout.data_region_offset(),
        layout.cluster_size_bytes(),
        layout.data_cluster_count(),
        fs.cluster_bound() - 2,
    );

    out.write_all(info.as_bytes()).map_err(|e| io_error(&e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(command: &str, args: &[&str]) -> CommandResult {
        let args = args.iter().map(ToString::to_string).collect::<Vec<_>>();
        let mut out = Vec::new();
        execute_command(command, &args, Path::new("/nonexistent/fat.img"), &mut out)
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(run("format", &[]), Err("Unknown command: format".to_string()));
    }

    #[test]
    fn test_argument_count() {
        let err = run("cp", &["a.txt"]).unwrap_err();
        assert!(err.starts_with("cp expects 2 argument(s)"), "{err}");
        let err = run("ls", &["extra"]).unwrap_err();
        assert!(err.starts_with("ls expects 0 argument(s)"), "{err}");
    }

    #[test]
    fn test_missing_image() {
        let err = run("ls", &[]).unwrap_err();
        assert!(err.starts_with("Could not open /nonexistent/fat.img"), "{err}");
    }

    #[test]
    fn test_usage() {
        let usage = usage("fatimg");
        for command in ["ls", "cat", "cp", "mv", "rm", "info"] {
            assert!(usage.contains(&format!("fatimg {command} ")), "{command}");
        }
    }
}
