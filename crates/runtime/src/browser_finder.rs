//! Chrome/Chromium executable discovery.

use std::path::{Path, PathBuf};

/// Returns the first installed Chromium-family browser, if any.
pub fn find_chrome_executable() -> Option<PathBuf> {
	chrome_candidates().into_iter().find_map(|candidate| resolve_candidate(&candidate))
}

fn resolve_candidate(candidate: &str) -> Option<PathBuf> {
	if candidate.starts_with('/') || candidate.contains('\\') || candidate.contains(':') {
		let path = Path::new(candidate);
		path.exists().then(|| path.to_path_buf())
	} else {
		which::which(candidate).ok()
	}
}

fn chrome_candidates() -> Vec<String> {
	if cfg!(target_os = "macos") {
		[
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
			"/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	} else if cfg!(target_os = "windows") {
		windows_candidates()
	} else {
		[
			"google-chrome-stable",
			"google-chrome",
			"chromium",
			"chromium-browser",
			"/usr/bin/google-chrome-stable",
			"/usr/bin/google-chrome",
			"/usr/bin/chromium",
			"/usr/bin/chromium-browser",
			"/snap/bin/chromium",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	}
}

fn windows_candidates() -> Vec<String> {
	let mut roots: Vec<PathBuf> = ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
		.into_iter()
		.filter_map(|key| std::env::var(key).ok().map(PathBuf::from))
		.collect();
	if roots.is_empty() {
		roots.push(PathBuf::from(r"C:\Program Files"));
		roots.push(PathBuf::from(r"C:\Program Files (x86)"));
	}

	let suffixes: &[&[&str]] = &[
		&["Google", "Chrome", "Application", "chrome.exe"],
		&["Chromium", "Application", "chrome.exe"],
		&["Microsoft", "Edge", "Application", "msedge.exe"],
	];

	let mut candidates: Vec<String> = roots
		.iter()
		.flat_map(|root| {
			suffixes
				.iter()
				.map(move |suffix| suffix.iter().fold(root.clone(), |path, part| path.join(part)).to_string_lossy().to_string())
		})
		.collect();
	candidates.extend(["chrome.exe", "chromium.exe", "msedge.exe"].map(str::to_string));
	candidates
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn windows_candidates_include_common_commands() {
		let candidates = windows_candidates();
		assert!(candidates.contains(&"chrome.exe".to_string()));
		assert!(candidates.contains(&"msedge.exe".to_string()));
		assert!(candidates.iter().any(|c| c.ends_with("chrome.exe") && c.contains("Google")));
	}

	#[test]
	fn absolute_candidate_must_exist() {
		assert!(resolve_candidate("/definitely/not/a/browser").is_none());
	}

	#[cfg(unix)]
	#[test]
	fn bare_command_resolves_through_path() {
		assert!(resolve_candidate("sh").is_some());
	}
}
