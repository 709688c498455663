mod tests_edit;
mod tests_version;
