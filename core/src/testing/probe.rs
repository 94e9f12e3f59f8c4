use std::{
    collections::{HashMap, HashSet, VecDeque},
    fs, io,
    path::PathBuf,
};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Process {0} no longer exists")]
    Gone(u32),

    #[error("Cannot read '{}': {}", .0.to_string_lossy(), .1)]
    Io(PathBuf, #[source] io::Error),
}

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Read-only view of the host process table used by the monitored runner.
pub trait ProcessProbe: Send + Sync {
    /// Resident set size in bytes. `Ok(None)` when the OS has no figure for the
    /// process (e.g. it already exited and waits to be reaped).
    fn resident_memory(&self, pid: u32) -> Result<Option<u64>>;

    fn children(&self, pid: u32) -> Result<Vec<u32>>;

    /// All descendants of `pid` in breadth-first order, `pid` itself excluded.
    fn descendants(&self, pid: u32) -> Result<Vec<u32>> {
        let mut res = Vec::new();
        let mut queue = VecDeque::from([pid]);
        while let Some(cur) = queue.pop_front() {
            let children = match self.children(cur) {
                Ok(c) => c,
                Err(ProbeError::Gone(_)) if cur != pid => continue,
                Err(e) => return Err(e),
            };
            for c in children {
                res.push(c);
                queue.push_back(c);
            }
        }
        Ok(res)
    }

    /// Whether `pid` holds a socket that shows up in the host's inet connection tables.
    fn has_network_connection(&self, pid: u32) -> Result<bool>;
}

/// [`ProcessProbe`] backed by a procfs mount. Needs no elevated privileges for
/// processes owned by the same user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcfsProbe {
    root: PathBuf,
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self::with_root(Self::DEFAULT_ROOT)
    }
}

impl ProcfsProbe {
    const DEFAULT_ROOT: &str = "/proc";
    const NET_TABLES: [&str; 4] = ["tcp", "tcp6", "udp", "udp6"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pid_path(&self, pid: u32, file: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(file)
    }

    fn read_pid_file(&self, pid: u32, file: &str) -> Result<String> {
        let path = self.pid_path(pid, file);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProbeError::Gone(pid),
            _ => ProbeError::Io(path, e),
        })
    }

    fn ensure_alive(&self, pid: u32) -> Result<()> {
        if self.root.join(pid.to_string()).is_dir() {
            Ok(())
        } else {
            Err(ProbeError::Gone(pid))
        }
    }

    /// Maps every parent pid to its direct children in one pass over the table.
    fn parent_map(&self) -> Result<HashMap<u32, Vec<u32>>> {
        let dir = fs::read_dir(&self.root).map_err(|e| ProbeError::Io(self.root.clone(), e))?;

        let mut map: HashMap<u32, Vec<u32>> = HashMap::new();
        for entry in dir.filter_map(std::result::Result::ok) {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue
            };
            // Processes vanish while scanning; skip what cannot be read.
            let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
                continue
            };
            if let Some(ppid) = parse_ppid_from_stat(&stat) {
                map.entry(ppid).or_default().push(pid);
            }
        }
        for children in map.values_mut() {
            children.sort_unstable();
        }
        Ok(map)
    }

    fn children_from_table(&self, pid: u32) -> Result<Vec<u32>> {
        self.ensure_alive(pid)?;
        Ok(self.parent_map()?.remove(&pid).unwrap_or_default())
    }

    fn socket_inodes(&self, pid: u32) -> Result<HashSet<u64>> {
        let fd_dir = self.pid_path(pid, "fd");
        let entries = fs::read_dir(&fd_dir).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProbeError::Gone(pid),
            _ => ProbeError::Io(fd_dir.clone(), e),
        })?;

        Ok(entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| fs::read_link(entry.path()).ok())
            .filter_map(|target| parse_socket_inode(&target.to_string_lossy()))
            .collect())
    }
}

impl ProcessProbe for ProcfsProbe {
    fn resident_memory(&self, pid: u32) -> Result<Option<u64>> {
        let status = self.read_pid_file(pid, "status")?;
        Ok(parse_vm_rss(&status))
    }

    /// Reads `task/<tid>/children` of every thread, so a tick costs a few reads
    /// instead of a scan of the whole table. Kernels without that file fall back
    /// to the scan.
    fn children(&self, pid: u32) -> Result<Vec<u32>> {
        let task_dir = self.pid_path(pid, "task");
        let tasks = fs::read_dir(&task_dir).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProbeError::Gone(pid),
            _ => ProbeError::Io(task_dir.clone(), e),
        })?;

        let mut res = Vec::new();
        for task in tasks.filter_map(std::result::Result::ok) {
            let path = task.path().join("children");
            match fs::read_to_string(&path) {
                Ok(list) => {
                    res.extend(list.split_whitespace().filter_map(|s| s.parse::<u32>().ok()))
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if task.path().join("stat").is_file() {
                        return self.children_from_table(pid);
                    }
                    // thread exited while listing
                }
                Err(e) => return Err(ProbeError::Io(path, e)),
            }
        }
        res.sort_unstable();
        res.dedup();
        Ok(res)
    }

    fn descendants(&self, pid: u32) -> Result<Vec<u32>> {
        self.ensure_alive(pid)?;
        let map = self.parent_map()?;

        let mut res = Vec::new();
        let mut seen = HashSet::from([pid]);
        let mut queue = VecDeque::from([pid]);
        while let Some(cur) = queue.pop_front() {
            for &c in map.get(&cur).into_iter().flatten() {
                if seen.insert(c) {
                    res.push(c);
                    queue.push_back(c);
                }
            }
        }
        Ok(res)
    }

    fn has_network_connection(&self, pid: u32) -> Result<bool> {
        let inodes = self.socket_inodes(pid)?;
        if inodes.is_empty() {
            return Ok(false);
        }

        for table in Self::NET_TABLES {
            let path = self.root.join("net").join(table);
            let content = match fs::read_to_string(&path) {
                Ok(s) => s,
                // e.g. tcp6 on hosts without IPv6
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ProbeError::Io(path, e)),
            };
            if connection_inodes(&content).any(|inode| inodes.contains(&inode)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// `stat` looks like `pid (comm) state ppid ...`; comm may contain spaces and parens.
fn parse_ppid_from_stat(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find_map(|l| l.strip_prefix("VmRSS:"))?;
    let mut it = line.split_whitespace();
    let value: u64 = it.next()?.parse().ok()?;
    let unit = match it.next() {
        Some("kB") | None => 1024,
        Some("mB") => 1024 * 1024,
        Some(_) => return None,
    };
    Some(value * unit)
}

fn parse_socket_inode(link_target: &str) -> Option<u64> {
    link_target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Inode column of `/proc/net/{tcp,udp}[6]`, header line skipped.
fn connection_inodes(table: &str) -> impl Iterator<Item = u64> + '_ {
    table
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(9)?.parse().ok())
}

#[cfg(test)]
mod test {
    use super::*;

    const TCP_TABLE: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 55501 1 0000000000000000 100 0 0 10 0
   1: 0100007F:C350 0100007F:1F90 01 00000000:00000000 00:00000000 00000000  1000        0 77777 1 0000000000000000 20 4 30 10 -1
";

    struct Fixture {
        dir: tempfile::TempDir,
        children_files: bool,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("net")).unwrap();
            Self {
                dir,
                children_files: true,
            }
        }

        /// A kernel built without `task/<tid>/children`.
        fn without_children_files() -> Self {
            Self {
                children_files: false,
                ..Self::new()
            }
        }

        fn probe(&self) -> ProcfsProbe {
            ProcfsProbe::with_root(self.dir.path())
        }

        fn add_process(&self, pid: u32, comm: &str, ppid: u32, rss_kb: Option<u64>) {
            let p = self.dir.path().join(pid.to_string());
            fs::create_dir_all(p.join("fd")).unwrap();
            fs::write(
                p.join("stat"),
                format!("{} ({}) S {} {} {} 0 -1", pid, comm, ppid, pid, pid),
            )
            .unwrap();
            let mut status = format!("Name:\t{}\nPid:\t{}\nPPid:\t{}\n", comm, pid, ppid);
            if let Some(kb) = rss_kb {
                status += &format!("VmRSS:\t  {} kB\n", kb);
            }
            fs::write(p.join("status"), status).unwrap();

            let task = p.join("task").join(pid.to_string());
            fs::create_dir_all(&task).unwrap();
            fs::write(task.join("stat"), "").unwrap();
            if !self.children_files {
                return;
            }
            fs::write(task.join("children"), "").unwrap();
            let parent_children = self
                .dir
                .path()
                .join(ppid.to_string())
                .join("task")
                .join(ppid.to_string())
                .join("children");
            if let Ok(prev) = fs::read_to_string(&parent_children) {
                fs::write(&parent_children, format!("{}{} ", prev, pid)).unwrap();
            }
        }

        /// Extra thread of `pid` with its own children.
        fn add_thread(&self, pid: u32, tid: u32, children: &[u32]) {
            let task = self.dir.path().join(pid.to_string()).join("task").join(tid.to_string());
            fs::create_dir_all(&task).unwrap();
            fs::write(task.join("stat"), "").unwrap();
            let list: Vec<String> = children.iter().map(u32::to_string).collect();
            fs::write(task.join("children"), list.join(" ")).unwrap();
        }

        #[cfg(unix)]
        fn add_fd(&self, pid: u32, fd: u32, target: &str) {
            let link = self.dir.path().join(pid.to_string()).join("fd").join(fd.to_string());
            std::os::unix::fs::symlink(target, link).unwrap();
        }

        fn write_net(&self, table: &str, content: &str) {
            fs::write(self.dir.path().join("net").join(table), content).unwrap();
        }
    }

    #[test]
    fn parse_ppid_handles_weird_comm() {
        assert_eq!(parse_ppid_from_stat("42 (sh) S 7 42 42 0"), Some(7));
        assert_eq!(parse_ppid_from_stat("42 (a) b (c) R 9 1 1"), Some(9));
        assert_eq!(parse_ppid_from_stat("garbage"), None);
    }

    #[test]
    fn parse_vm_rss_in_bytes() {
        assert_eq!(parse_vm_rss("Name:\tx\nVmRSS:\t  2048 kB\n"), Some(2048 * 1024));
        assert_eq!(parse_vm_rss("Name:\tzombie\nState:\tZ\n"), None);
    }

    #[test]
    fn parse_socket_inode_only_for_sockets() {
        assert_eq!(parse_socket_inode("socket:[77777]"), Some(77777));
        assert_eq!(parse_socket_inode("pipe:[123]"), None);
        assert_eq!(parse_socket_inode("/dev/null"), None);
    }

    #[test]
    fn resident_memory_reads_status() {
        let f = Fixture::new();
        f.add_process(100, "cand", 1, Some(512));
        f.add_process(101, "zomb", 1, None);
        let p = f.probe();
        assert_eq!(p.resident_memory(100).unwrap(), Some(512 * 1024));
        assert_eq!(p.resident_memory(101).unwrap(), None);
        assert!(matches!(p.resident_memory(999), Err(ProbeError::Gone(999))));
    }

    fn process_tree(f: &Fixture) {
        f.add_process(1, "init", 0, Some(1));
        f.add_process(100, "cand", 1, Some(1));
        f.add_process(200, "my child", 100, Some(1));
        f.add_process(201, "sibling", 100, Some(1));
        f.add_process(300, "grandchild", 200, Some(1));
        f.add_process(400, "unrelated", 1, Some(1));
    }

    #[test]
    fn children_and_descendants() {
        let f = Fixture::new();
        process_tree(&f);
        let p = f.probe();

        assert_eq!(p.children(100).unwrap(), vec![200, 201]);
        assert_eq!(p.children(300).unwrap(), Vec::<u32>::new());
        assert_eq!(p.descendants(100).unwrap(), vec![200, 201, 300]);
        assert!(matches!(p.children(12345), Err(ProbeError::Gone(_))));
    }

    #[test]
    fn children_of_every_thread_are_listed() {
        let f = Fixture::new();
        process_tree(&f);
        f.add_thread(100, 150, &[500, 201]);

        assert_eq!(f.probe().children(100).unwrap(), vec![200, 201, 500]);
    }

    #[test]
    fn children_fall_back_to_table_scan() {
        let f = Fixture::without_children_files();
        process_tree(&f);
        let p = f.probe();

        assert_eq!(p.children(100).unwrap(), vec![200, 201]);
        assert_eq!(p.children(300).unwrap(), Vec::<u32>::new());
        assert_eq!(p.descendants(100).unwrap(), vec![200, 201, 300]);
        assert!(matches!(p.children(12345), Err(ProbeError::Gone(_))));
    }

    #[cfg(unix)]
    #[test]
    fn network_connection_matched_by_socket_inode() {
        let f = Fixture::new();
        f.write_net("tcp", TCP_TABLE);
        f.add_process(100, "cand", 1, Some(1));
        f.add_fd(100, 0, "pipe:[11]");
        f.add_fd(100, 1, "pipe:[12]");
        f.add_process(101, "net", 1, Some(1));
        f.add_fd(101, 3, "socket:[77777]");
        f.add_process(102, "unix-socket", 1, Some(1));
        f.add_fd(102, 3, "socket:[424242]");
        let p = f.probe();

        assert!(!p.has_network_connection(100).unwrap());
        assert!(p.has_network_connection(101).unwrap());
        assert!(!p.has_network_connection(102).unwrap());
        assert!(matches!(
            p.has_network_connection(999),
            Err(ProbeError::Gone(999))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn real_procfs_sees_current_process() {
        let p = ProcfsProbe::new();
        let me = std::process::id();
        assert!(p.resident_memory(me).unwrap().unwrap() > 0);
        assert!(!p.children(me).unwrap().contains(&me));
    }
}
