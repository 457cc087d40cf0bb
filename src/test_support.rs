//! Fake engine executables for subprocess tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Reads `<from> => <to>` from the rules file, applies it to every input
/// line with sed, writes `<stem>_ev.<ext>`, prints the completion marker and
/// then keeps running like the real engine does.
pub const SUBSTITUTE: &str = r#"
[ "$1" = "sc" ] || { echo "usage: sc RULES INPUT" >&2; exit 2; }
from=$(sed -n 's/^ *\([^ ]*\) *=> *\([^ ]*\).*$/\1/p' "$2" | head -n 1)
to=$(sed -n 's/^ *\([^ ]*\) *=> *\([^ ]*\).*$/\2/p' "$2" | head -n 1)
out="${3%.*}_ev.${3##*.}"
sed "s/$from/$to/g" "$3" > "$out"
echo "Applying changes"
echo "Wrote the final forms to $out"
exec sleep 30
"#;

/// Write an executable `/bin/sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}
