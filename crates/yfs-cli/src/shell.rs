//! Interactive shell over a YFS volume.

use std::io::{self, BufRead, Write};

use anyhow::Result;

use yfs::{TreeNode, Yfs};

pub struct Shell {
    fs: Yfs,
    cwd: String,
}

impl Shell {
    pub fn new(fs: Yfs) -> Self {
        Self {
            fs,
            cwd: "/".to_string(),
        }
    }

    /// Reads commands from stdin until `exit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        println!("YFS shell");
        println!("Block size: {} bytes", self.fs.block_size());
        println!("Type 'help' for available commands or 'exit' to quit");
        println!();

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("yfs:{}$ ", self.cwd);
            io::stdout().flush()?;

            let Some(line) = lines.next() else { break };
            let line = line?;
            let args = tokenize(line.trim());
            let Some((command, rest)) = args.split_first() else {
                continue;
            };

            match command.as_str() {
                "exit" | "quit" => {
                    println!("Goodbye!");
                    break;
                }
                "help" => print_help(),
                "ls" => self.cmd_ls(rest),
                "cd" => self.cmd_cd(rest),
                "pwd" => println!("{}", self.cwd),
                "cat" => self.cmd_cat(rest),
                "cp" => self.cmd_cp(rest),
                "mv" => self.cmd_mv(rest),
                "rm" => self.cmd_rm(rest),
                "mkdir" => self.cmd_mkdir(rest),
                "write" => self.cmd_write(rest),
                "push" => self.cmd_push(rest),
                "pull" => self.cmd_pull(rest),
                "tree" => self.cmd_tree(),
                "stats" => self.cmd_stats(),
                other => {
                    println!("Unknown command: {other}. Type 'help' for available commands.");
                }
            }
        }

        self.fs.close()?;
        Ok(())
    }

    fn resolve(&self, path: &str) -> String {
        resolve_path(&self.cwd, path)
    }

    fn cmd_ls(&self, args: &[String]) {
        let path = match args.first() {
            Some(arg) => self.resolve(arg),
            None => self.cwd.clone(),
        };
        let entries = match self.fs.ls(&path) {
            Ok(entries) => entries,
            Err(err) => {
                println!("Error: {err}");
                return;
            }
        };
        if entries.is_empty() {
            println!("Directory is empty");
            return;
        }
        for entry in &entries {
            if entry.is_directory {
                println!("d {:>11} {}/", entry.mod_time, entry.name);
            } else {
                println!("- {:>11} {:>8} {}", entry.mod_time, entry.size, entry.name);
            }
        }
    }

    fn cmd_cd(&mut self, args: &[String]) {
        let [path] = args else {
            println!("Usage: cd <path>");
            return;
        };
        let target = self.resolve(path);
        match self.fs.ls(&target) {
            Ok(_) => self.cwd = target,
            Err(err) => println!("Error: {err}"),
        }
    }

    fn cmd_cat(&self, args: &[String]) {
        let [path] = args else {
            println!("Usage: cat <file>");
            return;
        };
        match self.fs.read_file(&self.resolve(path)) {
            Ok(data) => {
                let text = String::from_utf8_lossy(&data);
                print!("{text}");
                if !text.ends_with('\n') {
                    println!();
                }
            }
            Err(err) => println!("Error: {err}"),
        }
    }

    fn cmd_cp(&self, args: &[String]) {
        let [src, dst] = args else {
            println!("Usage: cp <src> <dst>");
            return;
        };
        let (src, dst) = (self.resolve(src), self.resolve(dst));
        match self.fs.copy_file(&src, &dst) {
            Ok(()) => println!("Copied {src} to {dst}"),
            Err(err) => println!("Error: {err}"),
        }
    }

    fn cmd_mv(&self, args: &[String]) {
        let [src, dst] = args else {
            println!("Usage: mv <src> <dst>");
            return;
        };
        let (src, dst) = (self.resolve(src), self.resolve(dst));
        match self.fs.move_file(&src, &dst) {
            Ok(()) => println!("Moved {src} to {dst}"),
            Err(err) => println!("Error: {err}"),
        }
    }

    fn cmd_rm(&self, args: &[String]) {
        let [path] = args else {
            println!("Usage: rm <file>");
            return;
        };
        let path = self.resolve(path);
        match self.fs.delete_file(&path) {
            Ok(()) => println!("Deleted {path}"),
            Err(err) => println!("Error: {err}"),
        }
    }

    fn cmd_mkdir(&self, args: &[String]) {
        let [path] = args else {
            println!("Usage: mkdir <dir>");
            return;
        };
        let path = self.resolve(path);
        match self.fs.create_directory(&path) {
            Ok(()) => println!("Created directory {path}"),
            Err(err) => println!("Error: {err}"),
        }
    }

    fn cmd_write(&self, args: &[String]) {
        if args.len() < 2 {
            println!("Usage: write <file> <content>");
            return;
        }
        let path = self.resolve(&args[0]);
        let content = args[1..].join(" ");
        match self.fs.write_file(&path, content.as_bytes()) {
            Ok(()) => println!("Wrote {} bytes to {path}", content.len()),
            Err(err) => println!("Error: {err}"),
        }
    }

    fn cmd_push(&self, args: &[String]) {
        let [local, remote] = args else {
            println!("Usage: push <local_file> <remote_file>");
            return;
        };
        let data = match std::fs::read(local) {
            Ok(data) => data,
            Err(err) => {
                println!("Error reading local file: {err}");
                return;
            }
        };
        let remote = self.resolve(remote);
        match self.fs.write_file(&remote, &data) {
            Ok(()) => println!("Pushed {local} ({} bytes) to {remote}", data.len()),
            Err(err) => println!("Error writing to volume: {err}"),
        }
    }

    fn cmd_pull(&self, args: &[String]) {
        let [remote, local] = args else {
            println!("Usage: pull <remote_file> <local_file>");
            return;
        };
        let remote = self.resolve(remote);
        let data = match self.fs.read_file(&remote) {
            Ok(data) => data,
            Err(err) => {
                println!("Error reading from volume: {err}");
                return;
            }
        };
        match std::fs::write(local, &data) {
            Ok(()) => println!("Pulled {remote} ({} bytes) to {local}", data.len()),
            Err(err) => println!("Error writing local file: {err}"),
        }
    }

    fn cmd_tree(&self) {
        let tree = self.fs.ls_all();
        println!("/");
        for child in &tree.children {
            print_tree(child, "");
        }
    }

    fn cmd_stats(&self) {
        match self.fs.get_stats() {
            Ok(stats) => {
                println!("Filesystem Statistics:");
                for (key, value) in &stats {
                    println!("  {key}: {value}");
                }
            }
            Err(err) => println!("Error: {err}"),
        }
    }
}

fn print_tree(node: &TreeNode, indent: &str) {
    if node.is_directory {
        println!("{indent}├── {}/", node.name);
    } else {
        println!("{indent}├── {} ({} bytes)", node.name, node.size);
    }
    let child_indent = format!("{indent}│   ");
    for child in &node.children {
        print_tree(child, &child_indent);
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  ls [path]                   - List directory contents");
    println!("  cd <path>                   - Change current directory");
    println!("  pwd                         - Print current directory");
    println!("  cat <file>                  - Display file contents");
    println!("  cp <src> <dst>              - Copy file within the volume");
    println!("  mv <src> <dst>              - Move/rename file within the volume");
    println!("  rm <file>                   - Delete file");
    println!("  mkdir <dir>                 - Create directory");
    println!("  write <file> <content>      - Write content to file");
    println!("  push <local_file> <remote_file>  - Copy local file into the volume");
    println!("  pull <remote_file> <local_file>  - Copy volume file to the local filesystem");
    println!("  tree                        - Show complete directory tree");
    println!("  stats                       - Show filesystem statistics");
    println!("  help                        - Show this help");
    println!("  exit, quit                  - Exit the shell");
}

/// Turns a possibly-relative `path` into an absolute one against `cwd`,
/// handling `.` and `..`.
fn resolve_path(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }
    if path == "." {
        return cwd.to_string();
    }
    if path == ".." {
        let parts: Vec<&str> = cwd.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() <= 1 {
            return "/".to_string();
        }
        return format!("/{}", parts[..parts.len() - 1].join("/"));
    }
    if cwd == "/" {
        format!("/{path}")
    } else {
        format!("{cwd}/{path}")
    }
}

/// Splits a command line on spaces, honoring double quotes and backslash
/// escapes.
fn tokenize(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            in_quotes = !in_quotes;
        } else if c == ' ' && !in_quotes {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}
