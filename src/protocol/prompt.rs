/// Instructions appended to the system prompt so the model knows the tag
/// protocol. The model conditions on this exact wording; paths in it are
/// described relative to `output/`, the default sandbox root.
const PROTOCOL_PROMPT: &str = concat!(
    "📁 文件操作指令支持：\n",
    "请使用以下 XML-like 标签格式包围操作指令：\n\n",
    "<create_file path=\"相对路径\">\n",
    "文件内容（支持多行）\n",
    "</create_file>\n\n",
    "<read_file path=\"文件名\" />\n\n",
    "<update_file path=\"相对路径\">\n",
    "新内容\n",
    "</update_file>\n\n",
    "<delete_file path=\"文件名\" />\n\n",
    "<list_files filter=\"可选的文件名或路径过滤模式（如 *.py, log/*.log）\" />\n",
    "  <!-- 无 filter：仅列出 / 根目录文件（不递归） -->\n",
    "  <!-- 有 filter：递归搜索所有子目录并匹配 -->\n\n",
    "<list_dir path=\"子目录路径\" filter=\"可选的过滤模式\" />\n",
    "  <!-- 无 filter：仅列出该目录下文件（不递归） -->\n",
    "  <!-- 有 filter：递归搜索该目录及其子目录并匹配 -->\n\n",
    "📌 规则说明：\n",
    "- 所有路径相对于 output/ 目录\n",
    "- 不允许 ../ 路径穿越\n",
    "- 更新文件之前必须要先阅读文件\n",
    "- `filter` 支持通配符：`*` 匹配任意字符，`?` 匹配单个字符\n",
    "- 过滤时，匹配的是 **相对于 output/ 的完整路径**（例如：log/app_2024-06-25.log）\n",
    "- 内容可包含换行、冒号、引号等字符\n",
    "- 如果需要分步决策，请返回 <again reason=\"...\" />\n",
    "- 系统将自动执行并反馈结果，您可以基于新状态继续操作。\n\n",
);

/// Returns the protocol description for injection into model instructions.
pub fn protocol_prompt() -> &'static str {
    PROTOCOL_PROMPT
}
